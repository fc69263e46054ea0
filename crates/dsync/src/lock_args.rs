use dsync_common::error::{DsyncError, Result};
use serde::{Deserialize, Serialize};

/// Arguments carried by every call to a [`NetLocker`](crate::NetLocker).
///
/// One value is built per acquisition attempt and reused unchanged for the
/// refresh and release calls of the resulting hold.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockArgs {
    /// Request id of one acquisition; grants are recorded under it.
    pub uid: String,
    pub resources: Vec<String>,
    pub owner: String,
    /// Free-form call-site description, for diagnostics only.
    pub source: String,
    /// Grants needed out of the locker set the request was sent to.
    pub quorum: usize,
}

impl LockArgs {
    pub fn new(
        uid: String,
        resources: Vec<String>,
        owner: String,
        source: String,
        quorum: usize,
    ) -> Self {
        Self {
            uid,
            resources,
            owner,
            source,
            quorum,
        }
    }

    /// Rejects a request that does not name at least one resource.
    pub fn validate(&self) -> Result<()> {
        if self.resources.is_empty() {
            return Err(DsyncError::InvalidArgument(
                "lock request names no resources".to_string(),
            ));
        }
        if self.resources.iter().any(|name| name.is_empty()) {
            return Err(DsyncError::InvalidArgument(format!(
                "lock request {} has an empty resource name",
                self.uid
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use dsync_common::DsyncError;

    use super::LockArgs;

    fn args(resources: &[&str]) -> LockArgs {
        LockArgs::new(
            "uid".to_string(),
            resources.iter().map(|name| name.to_string()).collect(),
            "owner".to_string(),
            "lock_args.rs".to_string(),
            2,
        )
    }

    #[test]
    fn resources_are_required() {
        assert!(args(&["a", "b"]).validate().is_ok());
        assert!(matches!(
            args(&[]).validate(),
            Err(DsyncError::InvalidArgument(_))
        ));
        assert!(matches!(
            args(&["a", ""]).validate(),
            Err(DsyncError::InvalidArgument(_))
        ));
    }

    #[test]
    fn wire_format_uses_field_names() {
        let json = serde_json::to_value(args(&["bucket/object"])).unwrap();
        assert_eq!(json["uid"], "uid");
        assert_eq!(json["resources"][0], "bucket/object");
        assert_eq!(json["quorum"], 2);
    }
}
