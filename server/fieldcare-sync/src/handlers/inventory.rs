//! Inventory handler.
//!
//! Stock is uniquely keyed by (owning pharmacy, SKU) in addition to id:
//! an upsert without an entity id resolves its target through the SKU
//! lookup. This is the only entity supporting delete, implemented as a
//! soft-delete marker. A soft-deleted row is invisible to pulls and to
//! the version gate; an upsert against it revives the row, still
//! incrementing the version. Non-admin actors act only on their own
//! pharmacy's stock.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use storage_layer::{InventoryItem, StorageError, StoreSession};
use uuid::Uuid;

use crate::authz::{self, AuthAction, Ownership};
use crate::error::{SyncError, SyncResult};
use crate::handlers::{decode_payload, parse_wire_date, EntityHandler, OpContext};
use crate::occ::{self, Gate};
use crate::protocol::{Actor, AppliedResult, EntityType, SyncAction, SyncOperation, MAX_PULL_ROWS};

#[derive(Debug, Deserialize)]
pub struct InventoryPayload {
    pub pharmacy_id: Uuid,
    pub sku: String,
    pub name: String,
    pub quantity: i64,
    pub unit: String,
    /// `YYYY-MM-DD`
    pub expiry_date: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InventoryItemView {
    pub id: Uuid,
    pub pharmacy_id: Uuid,
    pub sku: String,
    pub name: String,
    pub quantity: i64,
    pub unit: String,
    pub expiry_date: Option<String>,
    pub version: i64,
    pub updated_at: DateTime<Utc>,
}

pub(crate) fn project(row: &InventoryItem) -> InventoryItemView {
    InventoryItemView {
        id: row.id,
        pharmacy_id: row.pharmacy_id,
        sku: row.sku.clone(),
        name: row.name.clone(),
        quantity: row.quantity,
        unit: row.unit.clone(),
        expiry_date: row.expiry_date.map(|d| d.format("%Y-%m-%d").to_string()),
        version: row.version,
        updated_at: row.updated_at,
    }
}

fn stale_conflict(current: &InventoryItem) -> SyncResult<SyncError> {
    Ok(SyncError::VersionConflict {
        server_version: current.version,
        server_data: Some(serde_json::to_value(project(current))?),
    })
}

fn owning(actor: &Actor, pharmacy_id: Uuid) -> Ownership {
    if actor.actor_id == pharmacy_id {
        Ownership::Owner
    } else {
        Ownership::None
    }
}

pub struct InventoryHandler;

impl InventoryHandler {
    /// Resolve the target row by id, falling back to the (pharmacy, SKU)
    /// unique key. Soft-deleted rows are returned so the caller can
    /// distinguish revival from creation.
    async fn resolve(
        cx: &mut OpContext<'_>,
        op: &SyncOperation,
        payload: &InventoryPayload,
    ) -> SyncResult<Option<InventoryItem>> {
        if let Some(id) = op.entity_id {
            if let Some(row) = cx.session.get_inventory_item(id).await? {
                return Ok(Some(row));
            }
        }
        cx.session
            .find_inventory_by_sku(payload.pharmacy_id, &payload.sku)
            .await
            .map_err(Into::into)
    }

    async fn upsert(
        cx: &mut OpContext<'_>,
        op: &SyncOperation,
        payload: InventoryPayload,
    ) -> SyncResult<AppliedResult> {
        let expiry_date = payload
            .expiry_date
            .as_deref()
            .map(|d| parse_wire_date(d, "expiry_date"))
            .transpose()?;

        match Self::resolve(cx, op, &payload).await? {
            Some(current) => {
                // The gate skips soft-deleted rows; reviving them is a
                // blind upsert that still advances the version.
                if !current.is_deleted {
                    if let Gate::Stale { .. } = occ::check(op.base_version, current.version) {
                        return Err(stale_conflict(&current)?);
                    }
                }

                authz::authorize(
                    EntityType::InventoryItem,
                    AuthAction::Update,
                    cx.actor,
                    owning(cx.actor, current.pharmacy_id),
                )?;

                let row = InventoryItem {
                    id: current.id,
                    pharmacy_id: current.pharmacy_id,
                    sku: current.sku.clone(),
                    name: payload.name,
                    quantity: payload.quantity,
                    unit: payload.unit,
                    expiry_date,
                    is_deleted: false,
                    version: occ::next_version(current.version),
                    created_at: current.created_at,
                    updated_at: cx.now,
                };

                match cx.session.update_inventory_item(&row, current.version).await {
                    Ok(()) => Ok(AppliedResult {
                        op_id: op.op_id.clone(),
                        entity_id: row.id,
                        new_version: row.version,
                    }),
                    Err(StorageError::StaleVersion) => {
                        let fresh = cx.session.get_inventory_item(row.id).await?.ok_or_else(
                            || SyncError::NotFound(format!("inventory item {}", row.id)),
                        )?;
                        Err(stale_conflict(&fresh)?)
                    }
                    Err(e) => Err(e.into()),
                }
            }
            None => {
                authz::authorize(
                    EntityType::InventoryItem,
                    AuthAction::Create,
                    cx.actor,
                    owning(cx.actor, payload.pharmacy_id),
                )?;

                let row = InventoryItem {
                    id: op.entity_id.unwrap_or_else(Uuid::new_v4),
                    pharmacy_id: payload.pharmacy_id,
                    sku: payload.sku,
                    name: payload.name,
                    quantity: payload.quantity,
                    unit: payload.unit,
                    expiry_date,
                    is_deleted: false,
                    version: 1,
                    created_at: cx.now,
                    updated_at: cx.now,
                };
                cx.session.insert_inventory_item(&row).await?;

                Ok(AppliedResult {
                    op_id: op.op_id.clone(),
                    entity_id: row.id,
                    new_version: 1,
                })
            }
        }
    }

    async fn delete(
        cx: &mut OpContext<'_>,
        op: &SyncOperation,
        payload: InventoryPayload,
    ) -> SyncResult<AppliedResult> {
        let current = Self::resolve(cx, op, &payload)
            .await?
            .filter(|row| !row.is_deleted)
            .ok_or_else(|| {
                SyncError::NotFound(format!(
                    "inventory sku {} for pharmacy {}",
                    payload.sku, payload.pharmacy_id
                ))
            })?;

        if let Gate::Stale { .. } = occ::check(op.base_version, current.version) {
            return Err(stale_conflict(&current)?);
        }

        authz::authorize(
            EntityType::InventoryItem,
            AuthAction::Delete,
            cx.actor,
            owning(cx.actor, current.pharmacy_id),
        )?;

        let row = InventoryItem {
            is_deleted: true,
            version: occ::next_version(current.version),
            updated_at: cx.now,
            ..current.clone()
        };

        match cx.session.update_inventory_item(&row, current.version).await {
            Ok(()) => Ok(AppliedResult {
                op_id: op.op_id.clone(),
                entity_id: row.id,
                new_version: row.version,
            }),
            Err(StorageError::StaleVersion) => {
                let fresh = cx
                    .session
                    .get_inventory_item(row.id)
                    .await?
                    .ok_or_else(|| SyncError::NotFound(format!("inventory item {}", row.id)))?;
                Err(stale_conflict(&fresh)?)
            }
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl EntityHandler for InventoryHandler {
    async fn apply(&self, cx: &mut OpContext<'_>, op: &SyncOperation) -> SyncResult<AppliedResult> {
        let payload: InventoryPayload = decode_payload(&op.data)?;
        match op.action {
            SyncAction::Upsert => Self::upsert(cx, op, payload).await,
            SyncAction::Delete => Self::delete(cx, op, payload).await,
        }
    }
}

pub(crate) async fn collect(
    session: &mut dyn StoreSession,
    actor: &Actor,
    since: Option<DateTime<Utc>>,
) -> SyncResult<Vec<InventoryItemView>> {
    let scope = authz::visibility(EntityType::InventoryItem, actor);
    if scope.is_none() {
        return Ok(Vec::new());
    }
    let rows = session
        .inventory_items_since(&scope, since, MAX_PULL_ROWS)
        .await?;
    Ok(rows.iter().map(project).collect())
}
