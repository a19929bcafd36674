// SPDX-License-Identifier: GPL-3.0-only

//! Channels between the monitor loop and UI collaborators

use futures::stream::Stream;
use futures::task::{Context, Poll};
use media_types::{DeviceInfo, MonitorEvent};
use tokio::sync::{mpsc, oneshot};

use crate::config::LoggingLevel;
use crate::error::{MonitorError, Result};

/// Requests a UI collaborator can make of the monitor loop
#[derive(Debug)]
pub enum MonitorCommand {
    Mount(String),
    Unmount(String),
    Eject(String),
    /// Run a reconciliation pass now
    Rescan,
    /// Switch the log level of the running process
    SetLogLevel(LoggingLevel),
    /// Snapshot of every tracked device, sorted by path
    Devices(oneshot::Sender<Vec<DeviceInfo>>),
}

/// Cloneable sender side of the monitor loop.
///
/// The loop stops once every handle is dropped.
#[derive(Debug, Clone)]
pub struct MonitorHandle {
    commands: mpsc::UnboundedSender<MonitorCommand>,
}

impl MonitorHandle {
    pub(crate) fn new(commands: mpsc::UnboundedSender<MonitorCommand>) -> Self {
        Self { commands }
    }

    fn send(&self, command: MonitorCommand) -> Result<()> {
        self.commands
            .send(command)
            .map_err(|_| MonitorError::Closed)
    }

    pub fn mount(&self, path: impl Into<String>) -> Result<()> {
        self.send(MonitorCommand::Mount(path.into()))
    }

    pub fn unmount(&self, path: impl Into<String>) -> Result<()> {
        self.send(MonitorCommand::Unmount(path.into()))
    }

    pub fn eject(&self, path: impl Into<String>) -> Result<()> {
        self.send(MonitorCommand::Eject(path.into()))
    }

    pub fn rescan(&self) -> Result<()> {
        self.send(MonitorCommand::Rescan)
    }

    pub fn set_log_level(&self, level: LoggingLevel) -> Result<()> {
        self.send(MonitorCommand::SetLogLevel(level))
    }

    pub async fn devices(&self) -> Result<Vec<DeviceInfo>> {
        let (reply, response) = oneshot::channel();
        self.send(MonitorCommand::Devices(reply))?;
        response.await.map_err(|_| MonitorError::Closed)
    }
}

/// Stream of [`MonitorEvent`]s published by the monitor
pub struct MonitorEventStream {
    receiver: mpsc::UnboundedReceiver<MonitorEvent>,
}

impl MonitorEventStream {
    pub(crate) fn new(receiver: mpsc::UnboundedReceiver<MonitorEvent>) -> Self {
        Self { receiver }
    }

    /// Next event if one is already queued
    pub fn try_next_event(&mut self) -> Option<MonitorEvent> {
        self.receiver.try_recv().ok()
    }

    /// Everything queued right now
    pub fn drain(&mut self) -> Vec<MonitorEvent> {
        std::iter::from_fn(|| self.try_next_event()).collect()
    }
}

impl Stream for MonitorEventStream {
    type Item = MonitorEvent;

    fn poll_next(
        mut self: std::pin::Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Self::Item>> {
        self.receiver.poll_recv(cx)
    }
}
