//! # Sync Context
//!
//! The immutable per-session value every backend task receives: the shared
//! document, the presence handle, the optional token, the workspace and
//! the connectivity reporter.
//!
//! A context is built once per session and never mutated. Cloning is cheap;
//! every clone shares the same collaborators.

use std::sync::Arc;

use braid_core::validation::validate_workspace_id;
use braid_core::{SharedAwareness, SharedDocument};

use crate::error::SyncResult;
use crate::reporter::{ConnectivityListener, ConnectivityReporter};

struct ContextInner {
    document: SharedDocument,
    awareness: SharedAwareness,
    token: Option<String>,
    workspace: String,
    reporter: ConnectivityReporter,
}

#[derive(Clone)]
pub struct SyncContext {
    inner: Arc<ContextInner>,
}

impl std::fmt::Debug for SyncContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncContext")
            .field("workspace", &self.inner.workspace)
            .field("token", &self.inner.token.as_ref().map(|_| "<redacted>"))
            .field("reporter", &self.inner.reporter)
            .finish()
    }
}

impl SyncContext {
    /// Builds a context.
    ///
    /// An empty token counts as absent, so relay backends are skipped.
    /// Fails if the workspace id is not valid.
    pub fn new(
        document: SharedDocument,
        awareness: SharedAwareness,
        workspace: impl Into<String>,
        token: Option<String>,
        reporter: ConnectivityReporter,
    ) -> SyncResult<Self> {
        let workspace = workspace.into().trim().to_string();
        validate_workspace_id(&workspace)?;

        Ok(SyncContext {
            inner: Arc::new(ContextInner {
                document,
                awareness,
                token: token.filter(|t| !t.trim().is_empty()),
                workspace,
                reporter,
            }),
        })
    }

    pub fn builder(
        document: SharedDocument,
        awareness: SharedAwareness,
        workspace: impl Into<String>,
    ) -> SyncContextBuilder {
        SyncContextBuilder {
            document,
            awareness,
            workspace: workspace.into(),
            token: None,
            reporter: None,
        }
    }

    pub fn document(&self) -> &SharedDocument {
        &self.inner.document
    }

    pub fn awareness(&self) -> &SharedAwareness {
        &self.inner.awareness
    }

    pub fn token(&self) -> Option<&str> {
        self.inner.token.as_deref()
    }

    pub fn workspace(&self) -> &str {
        &self.inner.workspace
    }

    pub fn reporter(&self) -> &ConnectivityReporter {
        &self.inner.reporter
    }
}

/// Builder for [`SyncContext`].
pub struct SyncContextBuilder {
    document: SharedDocument,
    awareness: SharedAwareness,
    workspace: String,
    token: Option<String>,
    reporter: Option<ConnectivityReporter>,
}

impl SyncContextBuilder {
    pub fn token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Forwards connectivity emissions to `listener`.
    pub fn on_connectivity(mut self, listener: Arc<dyn ConnectivityListener>) -> Self {
        self.reporter = Some(ConnectivityReporter::new(listener));
        self
    }

    pub fn reporter(mut self, reporter: ConnectivityReporter) -> Self {
        self.reporter = Some(reporter);
        self
    }

    pub fn build(self) -> SyncResult<SyncContext> {
        SyncContext::new(
            self.document,
            self.awareness,
            self.workspace,
            self.token,
            self.reporter.unwrap_or_default(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SyncError;
    use braid_core::{MemoryAwareness, MemoryDocument};

    fn parts() -> (SharedDocument, SharedAwareness) {
        (MemoryDocument::shared(), Arc::new(MemoryAwareness::new(1)))
    }

    #[test]
    fn test_empty_token_is_absent() {
        let (document, awareness) = parts();
        let ctx = SyncContext::builder(document, awareness, "notes")
            .token("  ")
            .build()
            .unwrap();
        assert_eq!(ctx.token(), None);
    }

    #[test]
    fn test_invalid_workspace_rejected() {
        let (document, awareness) = parts();
        let err = SyncContext::builder(document, awareness, "a/b")
            .build()
            .unwrap_err();
        assert!(matches!(err, SyncError::Validation(_)));
    }

    #[test]
    fn test_debug_redacts_token() {
        let (document, awareness) = parts();
        let ctx = SyncContext::builder(document, awareness, " notes ")
            .token("secret-token")
            .build()
            .unwrap();

        assert_eq!(ctx.workspace(), "notes");
        assert_eq!(ctx.token(), Some("secret-token"));
        assert!(!format!("{:?}", ctx).contains("secret-token"));
    }
}
