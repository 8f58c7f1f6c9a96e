//! Per-device command queue.
//!
//! ```text
//! (enqueue) -> Queued
//! Queued   --report NotNow-->      NotNow
//! Queued / NotNow --report other--> Done
//! any      --clear_queue-->         Inactive
//! ```
//!
//! Reports on `Done` or `Inactive` commands are dropped, so a late or
//! duplicate report never re-queues a finished command.

use crate::core::context::RequestContext;
use crate::core::error::{StoreError, StoreResult};
use crate::core::time::Clock;
use crate::mdm::command::{Command, CommandResults, STATUS_NOT_NOW};
use crate::schema::keys;
use crate::schema::records::{attr, CommandRecord, QueueStatus};
use crate::storage::{AttributeValue, Filter, KeyValueTable, TableExt};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::Span;

/// Command queue for every enrollment.
pub struct CommandQueueStore<T: ?Sized> {
    table: Arc<T>,
    clock: Arc<dyn Clock>,
    delete_commands: bool,
    span: Span,
}

impl<T: KeyValueTable + ?Sized> CommandQueueStore<T> {
    /// With `delete_commands`, finished and invalidated commands are
    /// removed instead of being kept as `QueueDone` / `QueueInactive`.
    pub fn new(table: Arc<T>, clock: Arc<dyn Clock>, delete_commands: bool, span: Span) -> Self {
        Self {
            table,
            clock,
            delete_commands,
            span,
        }
    }

    /// Queue `command` for each device. Failures are reported per id and do
    /// not stop the rest of the batch.
    pub fn enqueue_command<S: AsRef<str>>(
        &self,
        ctx: &RequestContext,
        device_ids: &[S],
        command: &Command,
    ) -> BTreeMap<String, StoreError> {
        let now = self.clock.now();
        let mut failures = BTreeMap::new();

        for device_id in device_ids {
            let device_id = device_id.as_ref();
            let record = CommandRecord {
                device_id: device_id.to_string(),
                command_uuid: command.command_uuid.clone(),
                request_type: command.request_type.clone(),
                payload: command.raw.clone(),
                status: QueueStatus::Queued,
                report_status: None,
                enqueued_at: now,
                last_updated: now,
                result: None,
            };
            if let Err(e) = self.table.put_record(ctx, &record) {
                tracing::warn!(
                    parent: &self.span,
                    device_id,
                    command_uuid = %command.command_uuid,
                    error = %e,
                    "enqueue failed"
                );
                failures.insert(device_id.to_string(), e);
            }
        }

        tracing::debug!(
            parent: &self.span,
            command_uuid = %command.command_uuid,
            request_type = %command.request_type,
            devices = device_ids.len(),
            failed = failures.len(),
            "command enqueued"
        );
        failures
    }

    /// The oldest pending command, or `None` when nothing is pending.
    ///
    /// `Queued` commands are always eligible; `NotNow` commands only when
    /// `skip_not_now` is false. Ties on enqueue time go to the smaller UUID.
    pub fn retrieve_next_command(
        &self,
        ctx: &RequestContext,
        device_id: &str,
        skip_not_now: bool,
    ) -> StoreResult<Option<Command>> {
        let mut statuses: Vec<AttributeValue> = vec![QueueStatus::Queued.into()];
        if !skip_not_now {
            statuses.push(QueueStatus::NotNow.into());
        }
        let filter = Filter::one_of(attr::STATUS, statuses);

        let next = self
            .table
            .query_records::<CommandRecord>(ctx, &keys::queue_pk(device_id), Some(&filter))?
            .into_iter()
            .min_by(|a, b| {
                (a.enqueued_at, &a.command_uuid).cmp(&(b.enqueued_at, &b.command_uuid))
            });

        Ok(next.map(|record| Command {
            command_uuid: record.command_uuid,
            request_type: record.request_type,
            raw: record.payload,
        }))
    }

    pub fn retrieve_command(
        &self,
        ctx: &RequestContext,
        device_id: &str,
        command_uuid: &str,
    ) -> StoreResult<Option<CommandRecord>> {
        self.table
            .get_record(ctx, &CommandRecord::key_for(device_id, command_uuid))
    }

    /// Every command in the device's queue, in UUID order.
    pub fn list_commands(
        &self,
        ctx: &RequestContext,
        device_id: &str,
    ) -> StoreResult<Vec<CommandRecord>> {
        self.table
            .query_records(ctx, &keys::queue_pk(device_id), None)
    }

    /// Apply a device's report to the command it names.
    ///
    /// `Idle` changes nothing. An unknown command is NotFound. `NotNow`
    /// defers the command; any other status finishes it.
    pub fn store_command_report(
        &self,
        ctx: &RequestContext,
        device_id: &str,
        report: &CommandResults,
    ) -> StoreResult<()> {
        if report.is_idle() {
            return Ok(());
        }

        let key = CommandRecord::key_for(device_id, &report.command_uuid);
        let mut record = self
            .table
            .get_record::<CommandRecord>(ctx, &key)?
            .ok_or_else(|| {
                StoreError::not_found(format!(
                    "command {} for {device_id}",
                    report.command_uuid
                ))
            })?;

        if record.status.is_terminal() {
            tracing::debug!(
                parent: &self.span,
                device_id,
                command_uuid = %report.command_uuid,
                status = %record.status,
                "dropping report on finished command"
            );
            return Ok(());
        }

        let next = if report.status == STATUS_NOT_NOW {
            QueueStatus::NotNow
        } else {
            QueueStatus::Done
        };

        if next == QueueStatus::Done && self.delete_commands {
            self.table.delete_item(ctx, &key)?;
        } else {
            record.status = next;
            record.report_status = Some(report.status.clone());
            record.result = Some(report.raw.clone());
            record.last_updated = self.clock.now();
            self.table.put_record(ctx, &record)?;
        }

        tracing::debug!(
            parent: &self.span,
            device_id,
            command_uuid = %report.command_uuid,
            report_status = %report.status,
            status = %next,
            "command report stored"
        );
        Ok(())
    }

    /// Invalidate every command queued for the device, whatever its state.
    pub fn clear_queue(&self, ctx: &RequestContext, device_id: &str) -> StoreResult<()> {
        let records = self.list_commands(ctx, device_id)?;
        let now = self.clock.now();
        let count = records.len();

        for mut record in records {
            if self.delete_commands {
                self.table
                    .delete_item(ctx, &CommandRecord::key_for(device_id, &record.command_uuid))?;
            } else {
                record.status = QueueStatus::Inactive;
                record.last_updated = now;
                self.table.put_record(ctx, &record)?;
            }
        }

        tracing::info!(parent: &self.span, device_id, commands = count, "queue cleared");
        Ok(())
    }
}

impl<T: ?Sized> std::fmt::Debug for CommandQueueStore<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandQueueStore")
            .field("delete_commands", &self.delete_commands)
            .finish_non_exhaustive()
    }
}
