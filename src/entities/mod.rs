pub mod customer;
pub mod customer_measurement;
pub mod gateway_checkout;
pub mod notification;
pub mod order;
pub mod order_item;
pub mod order_status_history;
pub mod payment;
pub mod user;

pub use order::{GarmentType, OrderStatus, PaymentStatus};
pub use payment::{PaymentMethod, PaymentRecordStatus};
pub use notification::NotificationType;
pub use user::UserRole;
