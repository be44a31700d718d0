//! Request decorators for DynamoDB operations.
//!
//! A decorator receives the fluent request builder just before it is sent and
//! returns it, optionally with out-of-band options added (consumed capacity
//! reporting, client request tokens, consistency). Decorators must not touch
//! the fields that carry the version swap; the store verifies this after
//! decoration and refuses to send a request whose swap was altered.

use std::fmt;
use std::sync::Arc;

use aws_sdk_dynamodb::operation::create_table::builders::CreateTableFluentBuilder;
use aws_sdk_dynamodb::operation::delete_item::builders::DeleteItemFluentBuilder;
use aws_sdk_dynamodb::operation::delete_table::builders::DeleteTableFluentBuilder;
use aws_sdk_dynamodb::operation::get_item::builders::GetItemFluentBuilder;
use aws_sdk_dynamodb::operation::put_item::builders::PutItemFluentBuilder;
use aws_sdk_dynamodb::operation::transact_write_items::builders::TransactWriteItemsFluentBuilder;

use crate::storage::{Result, StorageError};

/// A request decorator for one operation.
pub type Decorate<B> = Arc<dyn Fn(B) -> B + Send + Sync>;

/// Optional per-operation request decorators.
#[derive(Clone, Default)]
pub struct Decorators {
    get_item: Option<Decorate<GetItemFluentBuilder>>,
    put_item: Option<Decorate<PutItemFluentBuilder>>,
    delete_item: Option<Decorate<DeleteItemFluentBuilder>>,
    transact_write_items: Option<Decorate<TransactWriteItemsFluentBuilder>>,
    create_table: Option<Decorate<CreateTableFluentBuilder>>,
    delete_table: Option<Decorate<DeleteTableFluentBuilder>>,
}

impl fmt::Debug for Decorators {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Decorators")
            .field("get_item", &self.get_item.is_some())
            .field("put_item", &self.put_item.is_some())
            .field("delete_item", &self.delete_item.is_some())
            .field("transact_write_items", &self.transact_write_items.is_some())
            .field("create_table", &self.create_table.is_some())
            .field("delete_table", &self.delete_table.is_some())
            .finish()
    }
}

impl Decorators {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decorate `GetItem` requests used to query versions.
    pub fn with_get_item<F>(mut self, f: F) -> Self
    where
        F: Fn(GetItemFluentBuilder) -> GetItemFluentBuilder + Send + Sync + 'static,
    {
        self.get_item = Some(Arc::new(f));
        self
    }

    /// Decorate `PutItem` requests (single-item swaps and force-set).
    pub fn with_put_item<F>(mut self, f: F) -> Self
    where
        F: Fn(PutItemFluentBuilder) -> PutItemFluentBuilder + Send + Sync + 'static,
    {
        self.put_item = Some(Arc::new(f));
        self
    }

    /// Decorate `DeleteItem` requests (single-item swaps and cleanup).
    pub fn with_delete_item<F>(mut self, f: F) -> Self
    where
        F: Fn(DeleteItemFluentBuilder) -> DeleteItemFluentBuilder + Send + Sync + 'static,
    {
        self.delete_item = Some(Arc::new(f));
        self
    }

    /// Decorate `TransactWriteItems` requests.
    ///
    /// The first transaction item is the version swap. It must not be
    /// modified, removed or reordered: its condition decides whether the
    /// whole transaction counts as applied.
    pub fn with_transact_write_items<F>(mut self, f: F) -> Self
    where
        F: Fn(TransactWriteItemsFluentBuilder) -> TransactWriteItemsFluentBuilder
            + Send
            + Sync
            + 'static,
    {
        self.transact_write_items = Some(Arc::new(f));
        self
    }

    /// Decorate `CreateTable` requests issued by provisioning.
    pub fn with_create_table<F>(mut self, f: F) -> Self
    where
        F: Fn(CreateTableFluentBuilder) -> CreateTableFluentBuilder + Send + Sync + 'static,
    {
        self.create_table = Some(Arc::new(f));
        self
    }

    /// Decorate `DeleteTable` requests issued by deprovisioning.
    pub fn with_delete_table<F>(mut self, f: F) -> Self
    where
        F: Fn(DeleteTableFluentBuilder) -> DeleteTableFluentBuilder + Send + Sync + 'static,
    {
        self.delete_table = Some(Arc::new(f));
        self
    }

    pub(crate) fn get_item(&self, request: GetItemFluentBuilder) -> Result<GetItemFluentBuilder> {
        let Some(decorate) = &self.get_item else {
            return Ok(request);
        };

        let original = request.clone();
        let request = decorate(request);

        if request.get_table_name() != original.get_table_name()
            || request.get_key() != original.get_key()
        {
            return Err(StorageError::DecoratorViolation {
                operation: "GetItem",
            });
        }

        Ok(request)
    }

    pub(crate) fn put_item(&self, request: PutItemFluentBuilder) -> Result<PutItemFluentBuilder> {
        let Some(decorate) = &self.put_item else {
            return Ok(request);
        };

        let original = request.clone();
        let request = decorate(request);

        if request.get_table_name() != original.get_table_name()
            || request.get_item() != original.get_item()
            || request.get_condition_expression() != original.get_condition_expression()
            || request.get_expression_attribute_names() != original.get_expression_attribute_names()
            || request.get_expression_attribute_values()
                != original.get_expression_attribute_values()
        {
            return Err(StorageError::DecoratorViolation {
                operation: "PutItem",
            });
        }

        Ok(request)
    }

    pub(crate) fn delete_item(
        &self,
        request: DeleteItemFluentBuilder,
    ) -> Result<DeleteItemFluentBuilder> {
        let Some(decorate) = &self.delete_item else {
            return Ok(request);
        };

        let original = request.clone();
        let request = decorate(request);

        if request.get_table_name() != original.get_table_name()
            || request.get_key() != original.get_key()
            || request.get_condition_expression() != original.get_condition_expression()
            || request.get_expression_attribute_names() != original.get_expression_attribute_names()
            || request.get_expression_attribute_values()
                != original.get_expression_attribute_values()
        {
            return Err(StorageError::DecoratorViolation {
                operation: "DeleteItem",
            });
        }

        Ok(request)
    }

    pub(crate) fn transact_write_items(
        &self,
        request: TransactWriteItemsFluentBuilder,
    ) -> Result<TransactWriteItemsFluentBuilder> {
        let Some(decorate) = &self.transact_write_items else {
            return Ok(request);
        };

        let original = request.clone();
        let request = decorate(request);

        let first = |r: &TransactWriteItemsFluentBuilder| {
            r.get_transact_items()
                .as_ref()
                .and_then(|items| items.first().cloned())
        };

        if first(&request) != first(&original) {
            return Err(StorageError::DecoratorViolation {
                operation: "TransactWriteItems",
            });
        }

        Ok(request)
    }

    pub(crate) fn create_table(&self, request: CreateTableFluentBuilder) -> CreateTableFluentBuilder {
        match &self.create_table {
            Some(decorate) => decorate(request),
            None => request,
        }
    }

    pub(crate) fn delete_table(&self, request: DeleteTableFluentBuilder) -> DeleteTableFluentBuilder {
        match &self.delete_table {
            Some(decorate) => decorate(request),
            None => request,
        }
    }
}
