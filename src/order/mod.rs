//! Ordering subsystem: the shared partial-order tree, the requirements
//! observing it, and the per-consumer order results.

pub mod requirement;
pub mod service;
pub mod tree;

pub use requirement::{
    ElementOrderRequirement, OrderNotification, OrderOffset, OrderRequirement,
    RangeOrderRequirement,
};
pub use service::{
    CompInfo, ComparisonSource, IndexOrderResult, KeyValues, OrderService, OrderServiceRegistry,
    OrderTracingListener, RangeOrderResult, RequirementSubscriber,
};
pub use tree::{CompareFn, PartialOrderTree, RequirementId};
