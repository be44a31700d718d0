//! DynamoDB VersionStore implementation.
//!
//! Table schema:
//! - `handler`: handler identity (String, partition key)
//! - `resource`: resource identifier (Binary, sort key)
//! - `version`: current version token (Binary)
//!
//! Swaps are staged in a [`DynamoUnit`] and written on commit, either as a
//! single conditional write or as the first item of a `TransactWriteItems`
//! request alongside the caller's business items.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use aws_sdk_dynamodb::error::SdkError;
use aws_sdk_dynamodb::operation::transact_write_items::TransactWriteItemsError;
use aws_sdk_dynamodb::primitives::Blob;
use aws_sdk_dynamodb::types::{
    AttributeDefinition, AttributeValue, BillingMode, ConditionCheck, Delete, KeySchemaElement,
    KeyType, Put,
    ScalarAttributeType, TableStatus, TransactWriteItem,
};
use aws_sdk_dynamodb::Client;
use tracing::{debug, info, warn};

use super::Decorators;
use crate::config::DynamoConfig;
use crate::storage::{Result, StorageError, Swap, VersionStore};

/// Partition key attribute.
pub const HANDLER_ATTR: &str = "handler";
/// Sort key attribute.
pub const RESOURCE_ATTR: &str = "resource";
/// Version token attribute.
pub const VERSION_ATTR: &str = "version";

/// Cancellation reason code for a failed condition inside a transaction.
const CONDITIONAL_CHECK_FAILED: &str = "ConditionalCheckFailed";

/// Poll attempts while waiting for a new table to become active.
const TABLE_ACTIVE_ATTEMPTS: u32 = 60;
const TABLE_ACTIVE_INTERVAL: Duration = Duration::from_millis(500);

/// Empty binary key attributes are rejected by DynamoDB.
fn check_resource(resource: &[u8]) -> Result<()> {
    if resource.is_empty() {
        return Err(StorageError::EmptyResource);
    }
    Ok(())
}

fn dynamo_err<E>(err: E) -> StorageError
where
    aws_sdk_dynamodb::Error: From<E>,
{
    StorageError::Dynamo(Box::new(aws_sdk_dynamodb::Error::from(err)))
}

/// A swap staged in a unit, written on commit.
#[derive(Debug, Clone)]
struct PendingSwap {
    handler: String,
    resource: Vec<u8>,
    current: Vec<u8>,
    next: Vec<u8>,
}

impl PendingSwap {
    fn swap(&self) -> Swap<'_> {
        Swap::classify(&self.current, &self.next)
    }
}

/// Atomic unit for DynamoDB: the caller's business write items plus at most
/// one staged version swap.
///
/// On commit the version swap is always written as the first transaction
/// item, whatever order business items were pushed in.
#[derive(Debug, Default)]
pub struct DynamoUnit {
    swap: Option<PendingSwap>,
    items: Vec<TransactWriteItem>,
}

impl DynamoUnit {
    /// Add a business write to the unit.
    pub fn push(&mut self, item: TransactWriteItem) {
        self.items.push(item);
    }

    /// Business writes added so far.
    pub fn items(&self) -> &[TransactWriteItem] {
        &self.items
    }
}

/// DynamoDB implementation of VersionStore.
pub struct DynamoVersionStore {
    client: Client,
    table_name: String,
    decorators: Decorators,
}

impl DynamoVersionStore {
    /// Create a store over an existing client.
    pub fn new(client: Client, table_name: impl Into<String>) -> Self {
        Self {
            client,
            table_name: table_name.into(),
            decorators: Decorators::default(),
        }
    }

    /// Connect using the default AWS credential chain.
    pub async fn connect(config: &DynamoConfig) -> Result<Self> {
        let sdk_config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;

        let client = if let Some(endpoint) = &config.endpoint_url {
            let dynamo_config = aws_sdk_dynamodb::config::Builder::from(&sdk_config)
                .endpoint_url(endpoint)
                .build();
            Client::from_conf(dynamo_config)
        } else {
            Client::new(&sdk_config)
        };

        info!(table = %config.table, "Connected to DynamoDB for versions");

        Ok(Self::new(client, config.table.clone()))
    }

    /// Attach request decorators.
    pub fn with_decorators(mut self, decorators: Decorators) -> Self {
        self.decorators = decorators;
        self
    }

    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    fn key(handler: &str, resource: &[u8]) -> HashMap<String, AttributeValue> {
        HashMap::from([
            (HANDLER_ATTR.to_string(), AttributeValue::S(handler.to_string())),
            (
                RESOURCE_ATTR.to_string(),
                AttributeValue::B(Blob::new(resource.to_vec())),
            ),
        ])
    }

    fn item(handler: &str, resource: &[u8], version: &[u8]) -> HashMap<String, AttributeValue> {
        let mut item = Self::key(handler, resource);
        item.insert(
            VERSION_ATTR.to_string(),
            AttributeValue::B(Blob::new(version.to_vec())),
        );
        item
    }

    /// Condition guarding a swap: expression, attribute names, attribute values.
    fn condition(
        swap: &Swap<'_>,
    ) -> (
        &'static str,
        HashMap<String, String>,
        Option<HashMap<String, AttributeValue>>,
    ) {
        match swap {
            Swap::Insert { .. } | Swap::Absent => (
                "attribute_not_exists(#H)",
                HashMap::from([("#H".to_string(), HANDLER_ATTR.to_string())]),
                None,
            ),
            Swap::Update { current, .. } | Swap::Delete { current } => (
                "#V = :c",
                HashMap::from([("#V".to_string(), VERSION_ATTR.to_string())]),
                Some(HashMap::from([(
                    ":c".to_string(),
                    AttributeValue::B(Blob::new(current.to_vec())),
                )])),
            ),
        }
    }

    /// Build the transaction item for a staged swap.
    fn swap_item(&self, pending: &PendingSwap) -> Result<TransactWriteItem> {
        let swap = pending.swap();
        let (expression, names, values) = Self::condition(&swap);

        let item = match swap {
            Swap::Insert { next } | Swap::Update { next, .. } => TransactWriteItem::builder()
                .put(
                    Put::builder()
                        .table_name(&self.table_name)
                        .set_item(Some(Self::item(&pending.handler, &pending.resource, next)))
                        .condition_expression(expression)
                        .set_expression_attribute_names(Some(names))
                        .set_expression_attribute_values(values)
                        .build()?,
                )
                .build(),
            Swap::Delete { .. } => TransactWriteItem::builder()
                .delete(
                    Delete::builder()
                        .table_name(&self.table_name)
                        .set_key(Some(Self::key(&pending.handler, &pending.resource)))
                        .condition_expression(expression)
                        .set_expression_attribute_names(Some(names))
                        .set_expression_attribute_values(values)
                        .build()?,
                )
                .build(),
            Swap::Absent => TransactWriteItem::builder()
                .condition_check(
                    ConditionCheck::builder()
                        .table_name(&self.table_name)
                        .set_key(Some(Self::key(&pending.handler, &pending.resource)))
                        .condition_expression(expression)
                        .set_expression_attribute_names(Some(names))
                        .set_expression_attribute_values(values)
                        .build()?,
                )
                .build(),
        };

        Ok(item)
    }

    /// Write a staged swap on its own as a conditional single-item write.
    async fn write_swap(&self, pending: &PendingSwap) -> Result<bool> {
        let swap = pending.swap();
        if swap == Swap::Absent {
            // Nothing to write; a consistent read decides.
            return Ok(self
                .query(&pending.handler, &pending.resource)
                .await?
                .is_empty());
        }

        let (expression, names, values) = Self::condition(&swap);

        match swap {
            Swap::Insert { next } | Swap::Update { next, .. } => {
                let request = self
                    .client
                    .put_item()
                    .table_name(&self.table_name)
                    .set_item(Some(Self::item(&pending.handler, &pending.resource, next)))
                    .condition_expression(expression)
                    .set_expression_attribute_names(Some(names))
                    .set_expression_attribute_values(values);

                match self.decorators.put_item(request)?.send().await {
                    Ok(_) => Ok(true),
                    Err(e)
                        if e.as_service_error()
                            .is_some_and(|se| se.is_conditional_check_failed_exception()) =>
                    {
                        Ok(false)
                    }
                    Err(e) => Err(dynamo_err(e)),
                }
            }
            Swap::Delete { .. } => {
                let request = self
                    .client
                    .delete_item()
                    .table_name(&self.table_name)
                    .set_key(Some(Self::key(&pending.handler, &pending.resource)))
                    .condition_expression(expression)
                    .set_expression_attribute_names(Some(names))
                    .set_expression_attribute_values(values);

                match self.decorators.delete_item(request)?.send().await {
                    Ok(_) => Ok(true),
                    Err(e)
                        if e.as_service_error()
                            .is_some_and(|se| se.is_conditional_check_failed_exception()) =>
                    {
                        Ok(false)
                    }
                    Err(e) => Err(dynamo_err(e)),
                }
            }
            Swap::Absent => Ok(true),
        }
    }

    /// Write business items in one transaction, guarded by the swap item if any.
    async fn transact(&self, items: Vec<TransactWriteItem>, guarded: bool) -> Result<bool> {
        let request = self
            .client
            .transact_write_items()
            .set_transact_items(Some(items));

        match self.decorators.transact_write_items(request)?.send().await {
            Ok(_) => Ok(true),
            Err(e) if guarded && swap_condition_failed(&e) => Ok(false),
            Err(e) => Err(dynamo_err(e)),
        }
    }

    async fn wait_until_active(&self) -> Result<()> {
        for _ in 0..TABLE_ACTIVE_ATTEMPTS {
            let output = self
                .client
                .describe_table()
                .table_name(&self.table_name)
                .send()
                .await
                .map_err(dynamo_err)?;

            if output.table().and_then(|t| t.table_status()) == Some(&TableStatus::Active) {
                return Ok(());
            }

            tokio::time::sleep(TABLE_ACTIVE_INTERVAL).await;
        }

        Err(StorageError::TableNotActive {
            table: self.table_name.clone(),
        })
    }
}

/// Whether a cancelled transaction failed on the version swap's condition.
///
/// Only the first cancellation reason counts: the swap is always the first
/// item, and a failed condition on a business item is the caller's fault.
fn swap_condition_failed<R>(err: &SdkError<TransactWriteItemsError, R>) -> bool {
    match err.as_service_error() {
        Some(TransactWriteItemsError::TransactionCanceledException(ex)) => ex
            .cancellation_reasons()
            .first()
            .and_then(|reason| reason.code())
            == Some(CONDITIONAL_CHECK_FAILED),
        _ => false,
    }
}

#[async_trait]
impl VersionStore for DynamoVersionStore {
    type Unit = DynamoUnit;

    async fn query(&self, handler: &str, resource: &[u8]) -> Result<Vec<u8>> {
        check_resource(resource)?;

        let request = self
            .client
            .get_item()
            .table_name(&self.table_name)
            .set_key(Some(Self::key(handler, resource)))
            .consistent_read(true)
            .projection_expression("#V")
            .expression_attribute_names("#V", VERSION_ATTR);

        let output = self
            .decorators
            .get_item(request)?
            .send()
            .await
            .map_err(dynamo_err)?;

        let Some(item) = output.item() else {
            return Ok(Vec::new());
        };

        match item.get(VERSION_ATTR) {
            Some(AttributeValue::B(blob)) => Ok(blob.as_ref().to_vec()),
            other => {
                warn!(
                    handler = %handler,
                    resource = %hex::encode(resource),
                    attribute = ?other,
                    "Version item has no binary version attribute"
                );
                Err(StorageError::MalformedRecord {
                    handler: handler.to_string(),
                    resource: hex::encode(resource),
                })
            }
        }
    }

    async fn begin(&self) -> Result<Self::Unit> {
        Ok(DynamoUnit::default())
    }

    /// Stage the swap; the outcome is reported by `commit`.
    ///
    /// One swap per unit: staging again replaces the earlier swap.
    async fn compare_and_swap(
        &self,
        unit: &mut Self::Unit,
        handler: &str,
        resource: &[u8],
        current: &[u8],
        next: &[u8],
    ) -> Result<bool> {
        check_resource(resource)?;

        unit.swap = Some(PendingSwap {
            handler: handler.to_string(),
            resource: resource.to_vec(),
            current: current.to_vec(),
            next: next.to_vec(),
        });

        Ok(true)
    }

    async fn commit(&self, unit: Self::Unit) -> Result<bool> {
        let DynamoUnit { swap, items } = unit;

        let Some(pending) = swap else {
            if items.is_empty() {
                return Ok(true);
            }
            return self.transact(items, false).await;
        };

        let applied = if items.is_empty() {
            self.write_swap(&pending).await?
        } else {
            let mut all = Vec::with_capacity(items.len() + 1);
            all.push(self.swap_item(&pending)?);
            all.extend(items);
            self.transact(all, true).await?
        };

        debug!(
            handler = %pending.handler,
            resource = %hex::encode(&pending.resource),
            swap = pending.swap().kind(),
            applied,
            "Version compare-and-swap"
        );

        Ok(applied)
    }

    async fn rollback(&self, _unit: Self::Unit) -> Result<()> {
        // Nothing was sent; dropping the staged writes is enough.
        Ok(())
    }

    async fn delete(&self, handler: &str, resource: &[u8]) -> Result<()> {
        check_resource(resource)?;

        let request = self
            .client
            .delete_item()
            .table_name(&self.table_name)
            .set_key(Some(Self::key(handler, resource)));

        self.decorators
            .delete_item(request)?
            .send()
            .await
            .map_err(dynamo_err)?;

        Ok(())
    }

    async fn store(&self, handler: &str, resource: &[u8], version: &[u8]) -> Result<()> {
        check_resource(resource)?;

        if version.is_empty() {
            return self.delete(handler, resource).await;
        }

        let request = self
            .client
            .put_item()
            .table_name(&self.table_name)
            .set_item(Some(Self::item(handler, resource, version)));

        self.decorators
            .put_item(request)?
            .send()
            .await
            .map_err(dynamo_err)?;

        Ok(())
    }

    async fn provision(&self) -> Result<()> {
        let request = self
            .client
            .create_table()
            .table_name(&self.table_name)
            .attribute_definitions(
                AttributeDefinition::builder()
                    .attribute_name(HANDLER_ATTR)
                    .attribute_type(ScalarAttributeType::S)
                    .build()?,
            )
            .attribute_definitions(
                AttributeDefinition::builder()
                    .attribute_name(RESOURCE_ATTR)
                    .attribute_type(ScalarAttributeType::B)
                    .build()?,
            )
            .key_schema(
                KeySchemaElement::builder()
                    .attribute_name(HANDLER_ATTR)
                    .key_type(KeyType::Hash)
                    .build()?,
            )
            .key_schema(
                KeySchemaElement::builder()
                    .attribute_name(RESOURCE_ATTR)
                    .key_type(KeyType::Range)
                    .build()?,
            )
            .billing_mode(BillingMode::PayPerRequest);

        self.decorators
            .create_table(request)
            .send()
            .await
            .map_err(dynamo_err)?;

        self.wait_until_active().await?;

        info!(table = %self.table_name, "Version table provisioned");
        Ok(())
    }

    async fn deprovision(&self) -> Result<()> {
        let request = self.client.delete_table().table_name(&self.table_name);

        match self.decorators.delete_table(request).send().await {
            Ok(_) => {}
            Err(e)
                if e.as_service_error()
                    .is_some_and(|se| se.is_resource_not_found_exception()) => {}
            Err(e) => return Err(dynamo_err(e)),
        }

        info!(table = %self.table_name, "Version table dropped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use aws_sdk_dynamodb::config::{BehaviorVersion, Region};

    use super::*;

    fn store() -> DynamoVersionStore {
        let config = aws_sdk_dynamodb::Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new("us-east-1"))
            .build();
        DynamoVersionStore::new(Client::from_conf(config), "projection_occ")
    }

    fn pending(current: &[u8], next: &[u8]) -> PendingSwap {
        PendingSwap {
            handler: "orders".to_string(),
            resource: b"order-42".to_vec(),
            current: current.to_vec(),
            next: next.to_vec(),
        }
    }

    #[test]
    fn test_insert_item_requires_absent_record() {
        let item = store().swap_item(&pending(b"", b"v1")).unwrap();
        let put = item.put().expect("insert should be a put");

        assert_eq!(put.condition_expression(), Some("attribute_not_exists(#H)"));
        assert_eq!(
            put.item().get(VERSION_ATTR),
            Some(&AttributeValue::B(Blob::new(b"v1".to_vec())))
        );
        assert_eq!(
            put.item().get(HANDLER_ATTR),
            Some(&AttributeValue::S("orders".to_string()))
        );
    }

    #[test]
    fn test_update_item_requires_current_version() {
        let item = store().swap_item(&pending(b"v1", b"v2")).unwrap();
        let put = item.put().expect("update should be a put");

        assert_eq!(put.condition_expression(), Some("#V = :c"));
        assert_eq!(
            put.expression_attribute_values().and_then(|v| v.get(":c")),
            Some(&AttributeValue::B(Blob::new(b"v1".to_vec())))
        );
        assert_eq!(
            put.item().get(VERSION_ATTR),
            Some(&AttributeValue::B(Blob::new(b"v2".to_vec())))
        );
    }

    #[test]
    fn test_delete_item_requires_current_version() {
        let item = store().swap_item(&pending(b"v2", b"")).unwrap();
        assert!(item.put().is_none());
        let delete = item.delete().expect("empty next should be a delete");

        assert_eq!(delete.condition_expression(), Some("#V = :c"));
        assert_eq!(delete.key().len(), 2);
    }

    #[tokio::test]
    async fn test_compare_and_swap_stages_without_sending() {
        let store = store();
        let mut unit = store.begin().await.unwrap();

        let staged = store
            .compare_and_swap(&mut unit, "orders", b"order-42", b"", b"v1")
            .await
            .unwrap();

        assert!(staged);
        let swap = unit.swap.as_ref().expect("swap should be staged");
        assert_eq!(swap.next, b"v1");
    }

    #[tokio::test]
    async fn test_compare_and_swap_replaces_earlier_swap() {
        let store = store();
        let mut unit = store.begin().await.unwrap();

        store
            .compare_and_swap(&mut unit, "orders", b"order-42", b"", b"v1")
            .await
            .unwrap();
        store
            .compare_and_swap(&mut unit, "orders", b"order-42", b"v1", b"v2")
            .await
            .unwrap();

        let swap = unit.swap.as_ref().unwrap();
        assert_eq!(swap.current, b"v1");
        assert_eq!(swap.next, b"v2");
    }

    #[test]
    fn test_absence_check_item_is_condition_check() {
        let item = store().swap_item(&pending(b"", b"")).unwrap();
        assert!(item.put().is_none());
        assert!(item.delete().is_none());
        let check = item
            .condition_check()
            .expect("empty to empty should be a condition check");

        assert_eq!(check.condition_expression(), "attribute_not_exists(#H)");
        assert_eq!(check.key().len(), 2);
    }

    #[tokio::test]
    async fn test_empty_resource_is_rejected_before_sending() {
        let store = store();
        let mut unit = store.begin().await.unwrap();

        let result = store
            .compare_and_swap(&mut unit, "orders", b"", b"", b"v1")
            .await;
        assert!(matches!(result, Err(StorageError::EmptyResource)));
        assert!(unit.swap.is_none());

        assert!(matches!(
            store.query("orders", b"").await,
            Err(StorageError::EmptyResource)
        ));
        assert!(matches!(
            store.store("orders", b"", b"v1").await,
            Err(StorageError::EmptyResource)
        ));
    }

    #[tokio::test]
    async fn test_empty_unit_commits_without_request() {
        let store = store();
        let unit = store.begin().await.unwrap();

        assert!(store.commit(unit).await.unwrap());
    }
}
