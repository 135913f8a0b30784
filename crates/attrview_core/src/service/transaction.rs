//! Batch operation runner.
//!
//! # Responsibility
//! - Apply a list of operations in order and stop at the first failure.
//! - Report failures as a small transaction error record for callers.
//!
//! # Invariants
//! - Operations before the failing one stay applied; later ones never run.
//! - Each operation is its own load/mutate/save cycle.

use crate::model::operation::{Operation, OperationDecodeError};
use crate::repo::attribute_view_repo::AttributeViewStore;
use crate::repo::block_repo::BlockRepository;
use crate::service::attribute_view_service::{AttributeViewService, AvServiceError, ErrorKind};
use log::{error, info};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Transaction failure class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxErrorCode {
    BlockNotFound,
    WriteAttributeView,
    InvalidOperation,
    Conflict,
}

impl TxErrorCode {
    /// Numeric code for hosts that expect one.
    pub fn code(self) -> i32 {
        match self {
            Self::BlockNotFound => 0,
            Self::WriteAttributeView => 1,
            Self::InvalidOperation => 2,
            Self::Conflict => 3,
        }
    }
}

/// Failure of one operation inside a batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxError {
    pub code: TxErrorCode,
    /// Block ID for `BlockNotFound`, attribute view ID otherwise.
    pub id: String,
    pub msg: String,
    /// Position of the failing operation in the batch.
    pub index: usize,
}

impl Display for TxError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "operation {} failed ({:?}) for {}: {}",
            self.index, self.code, self.id, self.msg
        )
    }
}

impl Error for TxError {}

impl TxError {
    fn from_service(index: usize, av_id: &str, err: &AvServiceError) -> Self {
        let (code, id) = match err {
            AvServiceError::BlockNotFound(block_id) => {
                (TxErrorCode::BlockNotFound, block_id.clone())
            }
            other => {
                let code = match other.kind() {
                    ErrorKind::Conflict => TxErrorCode::Conflict,
                    ErrorKind::WriteFailure => TxErrorCode::WriteAttributeView,
                    ErrorKind::NotFound | ErrorKind::InvalidInput => TxErrorCode::InvalidOperation,
                };
                (code, av_id.to_string())
            }
        };
        Self {
            code,
            id,
            msg: err.to_string(),
            index,
        }
    }

    fn from_decode(err: &OperationDecodeError) -> Self {
        Self {
            code: TxErrorCode::InvalidOperation,
            id: String::new(),
            msg: err.to_string(),
            index: 0,
        }
    }
}

/// Applies `operations` in order, stopping at the first failure.
///
/// Returns the number of applied operations.
pub fn apply_operations<S: AttributeViewStore, B: BlockRepository>(
    service: &AttributeViewService<S, B>,
    operations: &[Operation],
) -> Result<usize, TxError> {
    for (index, operation) in operations.iter().enumerate() {
        if let Err(err) = service.apply(operation) {
            let tx_error = TxError::from_service(index, &operation.av_id, &err);
            error!(
                "event=av_tx module=service status=error applied={} total={} code={:?}",
                index,
                operations.len(),
                tx_error.code
            );
            return Err(tx_error);
        }
    }

    info!(
        "event=av_tx module=service status=ok applied={}",
        operations.len()
    );
    Ok(operations.len())
}

/// Decodes a JSON array of operations and applies it.
pub fn apply_json_operations<S: AttributeViewStore, B: BlockRepository>(
    service: &AttributeViewService<S, B>,
    json: &str,
) -> Result<usize, TxError> {
    let operations = Operation::list_from_json(json).map_err(|err| TxError::from_decode(&err))?;
    apply_operations(service, &operations)
}
