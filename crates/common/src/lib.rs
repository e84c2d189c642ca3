//! Shared types for the shopping-list migration wizard.

pub mod clock;
pub mod ids;
pub mod money;

pub use clock::{Clock, ManualClock, SystemClock};
pub use ids::{
    FlyerId, FlyerProductId, ItemId, ProductMasterId, SessionId, ShoppingListId, SnapshotId, StoreId,
    UserId,
};
pub use money::Money;
