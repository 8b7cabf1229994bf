// quirkmesh-api: transport abstraction for mesh device attribute access

pub mod cluster;
pub mod error;
pub mod strategy;
pub mod transport;
pub mod value;

pub use cluster::ClusterId;
pub use error::{Error, TransportErrorKind};
pub use strategy::{StrategyDescriptor, StrategyKind};
pub use transport::{
    ClusterCommand, ClusterRequest, OperationKind, OperationSet, ReportingConfig, Transport,
};
pub use value::AttributeValue;
