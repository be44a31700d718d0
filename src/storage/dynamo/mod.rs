//! DynamoDB storage implementations.

mod decorators;
mod version_store;

pub use decorators::{Decorate, Decorators};
pub use version_store::{
    DynamoUnit, DynamoVersionStore, HANDLER_ATTR, RESOURCE_ATTR, VERSION_ATTR,
};
