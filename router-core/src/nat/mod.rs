pub mod connection;
pub mod mapping;
pub mod pending;
pub mod table;

pub use connection::{ConnectionKey, NatConnection, TcpConnState};
pub use mapping::{MappingKey, NatMapping, NatMappingType};
pub use pending::PendingUnsolicited;
pub use table::{NatTable, NatTickAction};
