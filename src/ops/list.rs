//! The `list` operation.

use std::io::Write as _;
use std::path::Path;

use tokio_util::sync::CancellationToken;

use super::{Error, Program, Result};
use crate::exclude::ExcludeSet;
use crate::ext_sort::sort_stream;
use crate::path_stream::spawn_tar_stream;

impl Program {
    /// Print the paths contained in a placeholder archive, sorted by default
    /// or in original archive order with `sort = false`.
    pub async fn list(
        &mut self,
        cancel: &CancellationToken,
        input: &Path,
        sort: bool,
    ) -> Result<()> {
        if sort {
            self.prepare_tmp_dir().await?;
        }

        let mut stream = spawn_tar_stream(
            self.fs.clone(),
            input.to_path_buf(),
            ExcludeSet::empty(),
            cancel.clone(),
        );
        if sort {
            stream = sort_stream(stream, &self.sort_config, cancel);
        }

        while let Some(path) = stream.next().await? {
            writeln!(self.stdout, "{path}").map_err(Error::Stdout)?;
        }

        self.flush_stdout()
    }
}

// =============================================================================
// Tests
// =============================================================================
