//! Executes the file operations carried by an assistant payload.
//!
//! Creations run before edits so an edit may target a file created in the
//! same payload. Every operation produces a report; a failed operation never
//! aborts the batch.

use shared::response::{AssistantResponse, FileToCreate, FileToEdit};
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

/// Result of a single file operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OpOutcome {
    Created,
    Edited,
    /// The edit target exists but does not contain the original snippet.
    SnippetNotFound,
    /// The edit target does not exist.
    FileNotFound,
    Failed(String),
}

#[derive(Debug, Clone)]
pub struct OpReport {
    pub path: PathBuf,
    pub outcome: OpOutcome,
}

impl OpReport {
    /// One-line summary for the transcript.
    pub fn message(&self) -> String {
        let path = self.path.display();
        match &self.outcome {
            OpOutcome::Created => format!("✓ Created file: {path}"),
            OpOutcome::Edited => format!("✓ Applied edit to {path}"),
            OpOutcome::SnippetNotFound => {
                format!("⚠ Original snippet not found in {path}; no changes made")
            }
            OpOutcome::FileNotFound => format!("✗ File not found for editing: {path}"),
            OpOutcome::Failed(detail) => format!("✗ Operation on {path} failed: {detail}"),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self.outcome, OpOutcome::Created | OpOutcome::Edited)
    }
}

/// Applies payload operations relative to a base directory (normally the
/// process working directory).
pub struct FileOpExecutor {
    base_dir: PathBuf,
}

impl FileOpExecutor {
    pub fn new() -> io::Result<Self> {
        Ok(Self {
            base_dir: std::env::current_dir()?,
        })
    }

    pub fn with_base(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    /// Run every operation in the payload: creations first, then edits, each
    /// in listed order. Returns one report per operation.
    pub fn execute(&self, response: &AssistantResponse) -> Vec<OpReport> {
        let mut reports = Vec::new();
        for op in &response.files_to_create {
            reports.push(self.create(op));
        }
        for op in &response.files_to_edit {
            reports.push(self.edit(op));
        }
        reports
    }

    fn create(&self, op: &FileToCreate) -> OpReport {
        // Absolute paths are rewritten relative to the base directory so the
        // transcript shows where the file landed in the workspace.
        let rel = self.relativize(Path::new(&op.path));
        let target = self.base_dir.join(&rel);

        let outcome = (|| -> io::Result<()> {
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(&target, &op.content)
        })();

        match outcome {
            Ok(()) => {
                tracing::info!(path = %rel.display(), "created file");
                OpReport {
                    path: rel,
                    outcome: OpOutcome::Created,
                }
            }
            Err(e) => OpReport {
                path: rel,
                outcome: OpOutcome::Failed(e.to_string()),
            },
        }
    }

    fn edit(&self, op: &FileToEdit) -> OpReport {
        let path = Path::new(&op.path);
        let target = if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_dir.join(path)
        };
        let report_path = PathBuf::from(&op.path);

        let content = match fs::read_to_string(&target) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return OpReport {
                    path: report_path,
                    outcome: OpOutcome::FileNotFound,
                }
            }
            Err(e) => {
                return OpReport {
                    path: report_path,
                    outcome: OpOutcome::Failed(e.to_string()),
                }
            }
        };

        if !content.contains(&op.original_snippet) {
            return OpReport {
                path: report_path,
                outcome: OpOutcome::SnippetNotFound,
            };
        }

        // Only the first occurrence is replaced.
        let updated = content.replacen(&op.original_snippet, &op.new_snippet, 1);
        match fs::write(&target, updated) {
            Ok(()) => {
                tracing::info!(path = %report_path.display(), "applied edit");
                OpReport {
                    path: report_path,
                    outcome: OpOutcome::Edited,
                }
            }
            Err(e) => OpReport {
                path: report_path,
                outcome: OpOutcome::Failed(e.to_string()),
            },
        }
    }

    /// Express `path` relative to the base directory. Relative inputs are
    /// kept as-is; absolute inputs get the shared prefix stripped and `..`
    /// segments for whatever remains of the base.
    fn relativize(&self, path: &Path) -> PathBuf {
        if !path.is_absolute() {
            return path.to_path_buf();
        }
        let path_parts: Vec<Component> = path.components().collect();
        let base_parts: Vec<Component> = self.base_dir.components().collect();
        let common = path_parts
            .iter()
            .zip(base_parts.iter())
            .take_while(|(a, b)| a == b)
            .count();

        let mut rel = PathBuf::new();
        for _ in common..base_parts.len() {
            rel.push("..");
        }
        for part in &path_parts[common..] {
            rel.push(part);
        }
        rel
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::response::AssistantResponse;
    use tempfile::TempDir;

    fn executor() -> (TempDir, FileOpExecutor) {
        let dir = TempDir::new().unwrap();
        let ex = FileOpExecutor::with_base(dir.path());
        (dir, ex)
    }

    #[test]
    fn test_create_makes_parent_dirs() {
        let (dir, ex) = executor();
        let report = ex.create(&FileToCreate {
            path: "a/b/c.txt".into(),
            content: "nested".into(),
        });
        assert_eq!(report.outcome, OpOutcome::Created);
        let written = fs::read_to_string(dir.path().join("a/b/c.txt")).unwrap();
        assert_eq!(written, "nested");
    }

    #[test]
    fn test_create_rewrites_absolute_path() {
        let (dir, ex) = executor();
        let abs = dir.path().join("tool.py");
        let report = ex.create(&FileToCreate {
            path: abs.to_string_lossy().into_owned(),
            content: "print('hi')\n".into(),
        });
        assert_eq!(report.outcome, OpOutcome::Created);
        // The report shows the workspace-relative form.
        assert_eq!(report.path, PathBuf::from("tool.py"));
        assert!(dir.path().join("tool.py").exists());
    }

    #[test]
    fn test_edit_replaces_first_occurrence_only() {
        let (dir, ex) = executor();
        fs::write(dir.path().join("x.txt"), "foo bar foo").unwrap();
        let report = ex.edit(&FileToEdit {
            path: "x.txt".into(),
            original_snippet: "foo".into(),
            new_snippet: "baz".into(),
        });
        assert_eq!(report.outcome, OpOutcome::Edited);
        let content = fs::read_to_string(dir.path().join("x.txt")).unwrap();
        assert_eq!(content, "baz bar foo");
    }

    #[test]
    fn test_edit_missing_snippet_leaves_file_untouched() {
        let (dir, ex) = executor();
        fs::write(dir.path().join("x.txt"), "unrelated").unwrap();
        let report = ex.edit(&FileToEdit {
            path: "x.txt".into(),
            original_snippet: "absent".into(),
            new_snippet: "whatever".into(),
        });
        assert_eq!(report.outcome, OpOutcome::SnippetNotFound);
        assert_eq!(
            fs::read_to_string(dir.path().join("x.txt")).unwrap(),
            "unrelated"
        );
    }

    #[test]
    fn test_edit_missing_file() {
        let (_dir, ex) = executor();
        let report = ex.edit(&FileToEdit {
            path: "ghost.txt".into(),
            original_snippet: "a".into(),
            new_snippet: "b".into(),
        });
        assert_eq!(report.outcome, OpOutcome::FileNotFound);
    }

    #[test]
    fn test_creates_run_before_edits() {
        let (dir, ex) = executor();
        let response = AssistantResponse {
            assistant_reply: "setting up".into(),
            files_to_create: vec![FileToCreate {
                path: "new.txt".into(),
                content: "alpha".into(),
            }],
            files_to_edit: vec![FileToEdit {
                path: "new.txt".into(),
                original_snippet: "alpha".into(),
                new_snippet: "beta".into(),
            }],
        };
        let reports = ex.execute(&response);
        assert_eq!(reports.len(), 2);
        assert!(reports.iter().all(|r| r.is_success()));
        assert_eq!(
            fs::read_to_string(dir.path().join("new.txt")).unwrap(),
            "beta"
        );
    }

    #[test]
    fn test_failed_op_does_not_abort_batch() {
        let (dir, ex) = executor();
        fs::write(dir.path().join("ok.txt"), "hello world").unwrap();
        let response = AssistantResponse {
            assistant_reply: String::new(),
            files_to_create: vec![],
            files_to_edit: vec![
                FileToEdit {
                    path: "missing.txt".into(),
                    original_snippet: "x".into(),
                    new_snippet: "y".into(),
                },
                FileToEdit {
                    path: "ok.txt".into(),
                    original_snippet: "hello".into(),
                    new_snippet: "goodbye".into(),
                },
            ],
        };
        let reports = ex.execute(&response);
        assert_eq!(reports[0].outcome, OpOutcome::FileNotFound);
        assert_eq!(reports[1].outcome, OpOutcome::Edited);
    }

    #[test]
    fn test_report_messages() {
        let created = OpReport {
            path: "a.txt".into(),
            outcome: OpOutcome::Created,
        };
        assert!(created.message().contains("Created file"));
        let missing = OpReport {
            path: "b.txt".into(),
            outcome: OpOutcome::SnippetNotFound,
        };
        assert!(missing.message().contains("snippet not found"));
    }
}
