//! Host 层错误类型

use seq_runtime::{BusError, GateError, SchedulerError, SeqError};
use thiserror::Error;

use crate::config::ConfigError;
use crate::scene::SceneError;

/// Host 层统一错误
#[derive(Error, Debug)]
pub enum HostError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Scene(#[from] SceneError),

    #[error(transparent)]
    Runtime(#[from] SeqError),
}

impl From<BusError> for HostError {
    fn from(e: BusError) -> Self {
        Self::Runtime(e.into())
    }
}

impl From<SchedulerError> for HostError {
    fn from(e: SchedulerError) -> Self {
        Self::Runtime(e.into())
    }
}

impl From<GateError> for HostError {
    fn from(e: GateError) -> Self {
        Self::Runtime(e.into())
    }
}

pub type HostResult<T> = Result<T, HostError>;
