use crate::error::AppError;
use std::ffi::OsString;
use std::fmt::Display;
use std::path::Path;
use std::process::Command;

const EXIFTOOL_BIN: &str = "exiftool";

/// Builder for a single exiftool invocation.
///
/// Arguments are passed to the process verbatim, so paths with spaces or
/// shell metacharacters need no quoting.
#[derive(Debug, Default)]
pub struct ExiftoolCmd {
    args: Vec<OsString>,
}

impl ExiftoolCmd {
    pub fn new() -> Self {
        ExiftoolCmd { args: Vec::new() }
    }

    /// `-s3`: print tag values only, one per line.
    pub fn bare_output(mut self) -> Self {
        self.args.push("-s3".into());
        self
    }

    /// `-overwrite_original`: rewrite the file in place, no `_original` backup.
    pub fn overwrite_original(mut self) -> Self {
        self.args.push("-overwrite_original".into());
        self
    }

    pub fn read_tag(mut self, tag: &str) -> Self {
        self.args.push(format!("-{}", tag).into());
        self
    }

    pub fn set_tag(mut self, tag: &str, value: impl Display) -> Self {
        self.args.push(format!("-{}={}", tag, value).into());
        self
    }

    pub fn file(mut self, path: &Path) -> Self {
        self.args.push(path.as_os_str().to_os_string());
        self
    }

    #[cfg(test)]
    pub(crate) fn args(&self) -> &[OsString] {
        &self.args
    }

    /// Runs exiftool and returns its stdout. A non-zero exit status or a
    /// missing binary is reported as an exiftool error.
    pub fn run(self) -> Result<String, AppError> {
        log::debug!("Running exiftool with args: {:?}", self.args);
        let output = Command::new(EXIFTOOL_BIN).args(&self.args).output().map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                AppError::Exiftool(
                    "exiftool not found on PATH; install it from https://exiftool.org".to_string(),
                )
            } else {
                AppError::Io(e)
            }
        })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(AppError::Exiftool(format!(
                "exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// Queries the pixel width and height of an image file.
pub fn read_dimensions(path: &Path) -> Result<(u32, u32), AppError> {
    log::debug!("Querying dimensions of {:?}", path);
    let stdout = ExiftoolCmd::new()
        .bare_output()
        .read_tag("ImageWidth")
        .read_tag("ImageHeight")
        .file(path)
        .run()?;

    parse_dimensions(&stdout).ok_or_else(|| {
        AppError::Exiftool(format!(
            "could not measure {}: unexpected output {:?}",
            path.display(),
            stdout
        ))
    })
}

fn parse_dimensions(stdout: &str) -> Option<(u32, u32)> {
    let mut lines = stdout.lines().map(str::trim);
    let width = lines.next()?.parse().ok()?;
    let height = lines.next()?.parse().ok()?;
    Some((width, height))
}
