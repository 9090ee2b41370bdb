//! Records exchanged between the core and its callers.
//!
//! Every type that is cached derives `Serialize`/`Deserialize`; the cache
//! stores them as opaque JSON.

pub mod cart;
pub mod customer;
pub mod order;
pub mod product;

pub use cart::{CartLineView, CartMiss, CartOutcome, CartView};
pub use customer::{Customer, CustomerUpdate, NewCustomer};
pub use order::{
    LockedCart, LockedLine, OrderDraft, OrderDraftLine, OrderLineView, OrderView,
    PersistedOrder, PlaceOrderOutcome, PlacementStage,
};
pub use product::{NewProduct, Product};

/// Result of deleting an entity that other rows may still reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    /// The row was removed.
    Deleted,
    /// No row with that id exists.
    NotFound,
    /// Historical rows still reference it; nothing was removed.
    InUse,
}
