//! Splits an identifier set into fixed-size batches.

use crate::error::PipelineError;
use crate::types::{Batch, IdentifierSet, IndexType, Uid};

use super::stage::{Emit, Task};

pub(super) fn check_batch_size(batch_size: usize) -> Result<(), PipelineError> {
    if batch_size == 0 {
        return Err(PipelineError::configuration("batch size must be at least 1"));
    }
    Ok(())
}

/// Split `uids` into `ceil(n / batch_size)` disjoint batches. No ids → no batches.
pub fn group_into_batches(
    index_type: IndexType,
    uids: &[Uid],
    batch_size: usize,
) -> Result<Vec<Batch>, PipelineError> {
    check_batch_size(batch_size)?;
    Ok(uids
        .chunks(batch_size)
        .map(|chunk| Batch {
            index_type,
            uids: chunk.to_vec(),
        })
        .collect())
}

pub struct GroupingTask {
    batch_size: usize,
}

impl GroupingTask {
    pub fn new(batch_size: usize) -> Self {
        Self { batch_size }
    }
}

impl Task for GroupingTask {
    type Input = IdentifierSet;
    type Output = Batch;

    fn run(
        &mut self,
        set: IdentifierSet,
        emit: &mut Emit<'_, Batch>,
    ) -> Result<(), PipelineError> {
        check_batch_size(self.batch_size)?;
        for chunk in set.uids().chunks(self.batch_size) {
            emit(Batch {
                index_type: set.index_type,
                uids: chunk.to_vec(),
            })?;
        }
        Ok(())
    }
}
