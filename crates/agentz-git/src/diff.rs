//! Per-file diffs with binary and image handling.

use std::path::Path;

use base64::Engine as _;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::errors::GitError;
use crate::runner::{run_git, run_git_checked};
use crate::validation::{ensure_in_repo, validate_repo_relative_path};

/// Which side of the index to diff against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiffView {
    /// Staged when the file has staged changes, otherwise working.
    Auto,
    Staged,
    Working,
}

/// A single file's diff.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileDiff {
    pub path: String,
    pub is_binary: bool,
    /// Unified diff text; empty for binary files.
    pub patch: String,
    /// `data:` URL of the pre-change image, for image extensions.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub old_image: Option<String>,
    /// `data:` URL of the post-change image, for image extensions.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_image: Option<String>,
}

const IMAGE_EXTENSIONS: [(&str, &str); 6] = [
    ("png", "image/png"),
    ("jpg", "image/jpeg"),
    ("jpeg", "image/jpeg"),
    ("gif", "image/gif"),
    ("webp", "image/webp"),
    ("svg", "image/svg+xml"),
];

fn image_media_type(path: &str) -> Option<&'static str> {
    let extension = Path::new(path).extension()?.to_str()?.to_lowercase();
    IMAGE_EXTENSIONS
        .iter()
        .find(|(ext, _)| *ext == extension)
        .map(|(_, media)| *media)
}

/// Diff one file in `cwd`.
pub fn diff_file(cwd: &Path, file: &str, view: DiffView) -> Result<FileDiff, GitError> {
    ensure_in_repo(cwd)?;
    let relative = validate_repo_relative_path(cwd, file)?;
    let relative_str = relative.to_string_lossy().into_owned();

    let staged = match view {
        DiffView::Staged => true,
        DiffView::Working => false,
        DiffView::Auto => has_staged_changes(cwd, &relative_str)?,
    };

    let is_binary = is_binary_change(cwd, &relative_str, staged)?;

    if let Some(media_type) = image_media_type(&relative_str) {
        let (old_image, new_image) = image_sides(cwd, &relative_str, staged, media_type)?;
        return Ok(FileDiff {
            path: relative_str,
            is_binary: true,
            patch: String::new(),
            old_image,
            new_image,
        });
    }

    if is_binary {
        return Ok(FileDiff {
            path: relative_str,
            is_binary: true,
            patch: String::new(),
            old_image: None,
            new_image: None,
        });
    }

    let mut args: Vec<&str> = vec!["diff"];
    if staged {
        args.push("--cached");
    }
    args.push("--");
    args.push(&relative_str);
    let output = run_git_checked(cwd, &args)?;

    Ok(FileDiff {
        path: relative_str.clone(),
        is_binary: false,
        patch: output.stdout_text(),
        old_image: None,
        new_image: None,
    })
}

fn has_staged_changes(cwd: &Path, file: &str) -> Result<bool, GitError> {
    let output = run_git_checked(cwd, &["diff", "--cached", "--name-only", "--", file])?;
    Ok(!output.stdout_text().trim().is_empty())
}

/// Binary detection via `diff --numstat`: binary files report `-\t-\tpath`.
fn is_binary_change(cwd: &Path, file: &str, staged: bool) -> Result<bool, GitError> {
    let mut args: Vec<&str> = vec!["diff", "--numstat"];
    if staged {
        args.push("--cached");
    }
    args.push("--");
    args.push(file);
    let output = run_git_checked(cwd, &args)?;
    Ok(output
        .stdout_text()
        .lines()
        .any(|line| line.starts_with("-\t-\t")))
}

/// Base64 data URLs for the old (HEAD/index) and new (on-disk) image sides.
fn image_sides(
    cwd: &Path,
    file: &str,
    staged: bool,
    media_type: &str,
) -> Result<(Option<String>, Option<String>), GitError> {
    let old_ref = if staged {
        format!("HEAD:{}", file)
    } else {
        format!(":{}", file)
    };
    // A missing old side (newly added file) is not an error.
    let old_image = match run_git(cwd, &["show", old_ref.as_str()]) {
        Ok(output) if output.success() => Some(to_data_url(media_type, &output.stdout)),
        Ok(_) => None,
        Err(e) => return Err(e),
    };

    let on_disk = cwd.join(file);
    let new_image = match std::fs::read(&on_disk) {
        Ok(bytes) => Some(to_data_url(media_type, &bytes)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
        Err(e) => return Err(GitError::IoError { source: e }),
    };

    debug!(
        event = "git.diff.image_sides",
        file,
        has_old = old_image.is_some(),
        has_new = new_image.is_some(),
    );
    Ok((old_image, new_image))
}

fn to_data_url(media_type: &str, bytes: &[u8]) -> String {
    format!(
        "data:{};base64,{}",
        media_type,
        base64::engine::general_purpose::STANDARD.encode(bytes)
    )
}
