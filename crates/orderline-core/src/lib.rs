pub mod agents;
pub mod error;
pub mod events;
pub mod models;
pub mod phone;
pub mod queue;
pub mod storage;

pub use agents::AgentDirectory;
pub use error::OrderError;
pub use events::{
    AddressInput, CustomerInput, ItemInput, JOB_NEW_ORDER, NewOrderJob, OrderCreatedEvent,
    TOPIC_ORDER_CREATED, TOPIC_TRACKING_UPDATED, TrackingUpdatedEvent,
};
pub use models::{
    Address, Agent, Customer, ImportResult, ImportRowError, MessageStatus, NewAddress,
    NewCustomer, NewOrder, NewTracking, Order, OrderItem, OrderStatus, OrderTracking, Product,
    TrackingPatch,
};
pub use phone::{MalaysiaFormatter, PhoneFormatter, PhoneResolver, SingaporeFormatter};
pub use queue::{EventPublisher, Job, JobQueue};
pub use storage::{
    AddressStore, CustomerStore, ImportSource, LedgerMirror, OrderBackend, OrderStore,
    ProductStore, TrackingStore,
};
