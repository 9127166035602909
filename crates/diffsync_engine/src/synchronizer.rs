//! The diff/patch/checksum capability for one content type.

use crate::error::SyncResult;
use diffsync_protocol::{ClientDocument, Diff, Edit, ShadowDocument};
use sha2::{Digest, Sha256};

/// Returns the lowercase hex SHA-256 digest of `bytes`.
pub fn checksum_bytes(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Diffing, patching and checksumming for one content type.
///
/// Implementors supply [`diff`](Self::diff), [`apply`](Self::apply) and
/// [`checksum`](Self::checksum); the protocol-level operations are provided
/// on top of them.
///
/// # Contract
///
/// - `apply(diff(a, b), a) == b` for all contents `a` and `b`
/// - `diff(a, a)` is empty
/// - `checksum` is deterministic and equal for equal content
/// - `apply` is strict: it fails rather than guess
pub trait ClientSynchronizer: Send + Sync {
    /// The document content type.
    type Content: Clone + PartialEq + Send + Sync;

    /// Returns the diffs that turn `old` into `new`.
    fn diff(&self, old: &Self::Content, new: &Self::Content) -> Vec<Diff>;

    /// Applies `diffs` to `content`, failing if any diff does not fit.
    fn apply(&self, diffs: &[Diff], content: &Self::Content) -> SyncResult<Self::Content>;

    /// Applies what it can of `diffs` to content that may have moved on
    /// since the diffs were computed.
    ///
    /// The default keeps `content` untouched unless every diff applies.
    fn apply_fuzzy(&self, diffs: &[Diff], content: &Self::Content) -> Self::Content {
        match self.apply(diffs, content) {
            Ok(patched) => patched,
            Err(e) => {
                tracing::debug!(error = %e, "fuzzy patch skipped");
                content.clone()
            }
        }
    }

    /// Returns a digest of `content`.
    fn checksum(&self, content: &Self::Content) -> String;

    /// Computes the edit that brings `shadow` up to `document`.
    ///
    /// The edit is stamped with the shadow's versions and checksum.
    fn client_diff(
        &self,
        shadow: &ShadowDocument<Self::Content>,
        document: &ClientDocument<Self::Content>,
    ) -> Edit {
        Edit::new(
            document.id.clone(),
            document.client_id.clone(),
            shadow.client_version,
            shadow.server_version,
            self.checksum(shadow.content()),
        )
        .with_diffs(self.diff(shadow.content(), &document.content))
    }

    /// Applies a peer edit to the shadow and advances its server version.
    fn patch_shadow(
        &self,
        edit: &Edit,
        shadow: &ShadowDocument<Self::Content>,
    ) -> SyncResult<ShadowDocument<Self::Content>> {
        let content = self.apply(&edit.diffs, shadow.content())?;
        Ok(ShadowDocument::new(
            shadow.client_document.with_content(content),
            shadow.client_version,
            shadow.server_version + 1,
        ))
    }

    /// Applies a peer edit to the live client document.
    fn patch_document(
        &self,
        edit: &Edit,
        document: &ClientDocument<Self::Content>,
    ) -> ClientDocument<Self::Content> {
        document.with_content(self.apply_fuzzy(&edit.diffs, &document.content))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checksum_is_sha256_hex() {
        assert_eq!(
            checksum_bytes(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
        assert_eq!(checksum_bytes(b"abc").len(), 64);
    }
}
