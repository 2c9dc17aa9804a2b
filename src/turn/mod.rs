//! Turn context and external collaborators
//!
//! A [`TurnContext`] carries the ambient state of one conversation turn: the
//! incoming activity, the transport used to send outgoing activities, the
//! telemetry sink for diagnostic traces, and the turn's cancellation token.
//! The orchestration core threads it through every dialog context but never
//! inspects the activity payload beyond passing it along.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::{DialogError, DialogResult};

/// Severity attached to diagnostic traces
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TraceSeverity {
    Information,
    Warning,
    Error,
}

/// Outgoing side of the conversation transport
#[async_trait]
pub trait TurnTransport: Send + Sync {
    /// Send an activity back to the conversation
    async fn send_activity(&self, activity: Value) -> anyhow::Result<()>;
}

/// Telemetry sink for diagnostic traces
#[async_trait]
pub trait TelemetryClient: Send + Sync {
    /// Record a trace with a severity and optional structured context
    async fn send_trace(
        &self,
        message: &str,
        severity: TraceSeverity,
        context: Option<Value>,
    ) -> anyhow::Result<()>;
}

/// Transport that drops everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NullTransport;

#[async_trait]
impl TurnTransport for NullTransport {
    async fn send_activity(&self, _activity: Value) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Telemetry sink that drops everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NullTelemetry;

#[async_trait]
impl TelemetryClient for NullTelemetry {
    async fn send_trace(
        &self,
        _message: &str,
        _severity: TraceSeverity,
        _context: Option<Value>,
    ) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Ambient state for one conversation turn
pub struct TurnContext {
    /// Unique id of this turn
    pub turn_id: Uuid,

    /// When the turn's activity was received
    pub received_at: DateTime<Utc>,

    /// The incoming activity, opaque to the core
    pub activity: Value,

    transport: Arc<dyn TurnTransport>,
    telemetry: Arc<dyn TelemetryClient>,
    cancellation: CancellationToken,
}

impl TurnContext {
    /// Create a turn context around an incoming activity
    pub fn new(
        activity: Value,
        transport: Arc<dyn TurnTransport>,
        telemetry: Arc<dyn TelemetryClient>,
    ) -> Self {
        Self {
            turn_id: Uuid::new_v4(),
            received_at: Utc::now(),
            activity,
            transport,
            telemetry,
            cancellation: CancellationToken::new(),
        }
    }

    /// Attach an externally owned cancellation token
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    /// The turn's cancellation token
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }

    /// Fail with [`DialogError::TurnCancelled`] if the turn was cancelled
    ///
    /// Every suspension point in the core calls this before mutating any
    /// dialog instance, so a cancelled turn aborts without partial commits.
    pub fn ensure_active(&self) -> DialogResult<()> {
        if self.cancellation.is_cancelled() {
            Err(DialogError::TurnCancelled)
        } else {
            Ok(())
        }
    }

    /// Send an activity through the transport
    pub async fn send_activity(&self, activity: Value) -> DialogResult<()> {
        self.ensure_active()?;
        self.transport.send_activity(activity).await?;
        Ok(())
    }

    /// Record a diagnostic trace through the telemetry sink
    pub async fn send_trace(
        &self,
        message: &str,
        severity: TraceSeverity,
        context: Option<Value>,
    ) -> DialogResult<()> {
        self.telemetry.send_trace(message, severity, context).await?;
        Ok(())
    }
}

impl std::fmt::Debug for TurnContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TurnContext")
            .field("turn_id", &self.turn_id)
            .field("received_at", &self.received_at)
            .field("cancelled", &self.cancellation.is_cancelled())
            .finish()
    }
}
