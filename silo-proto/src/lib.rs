//! Generated protobuf/gRPC definitions for the silo remote KV protocol.

pub mod remote {
    tonic::include_proto!("silo.remote.v1");
}

use silo_kv::Version;

impl From<remote::VersionReply> for Version {
    fn from(reply: remote::VersionReply) -> Self {
        Version::new(reply.major, reply.minor, reply.patch)
    }
}

impl From<Version> for remote::VersionReply {
    fn from(v: Version) -> Self {
        remote::VersionReply { major: v.major, minor: v.minor, patch: v.patch }
    }
}

#[cfg(test)]
mod tests {
    use super::remote;
    use silo_kv::Version;

    #[test]
    fn version_reply_converts_to_model() {
        let reply = remote::VersionReply { major: 1, minor: 5, patch: 2 };
        let v: Version = reply.into();
        assert_eq!(v, Version::new(1, 5, 2));
    }

    #[test]
    fn pair_distinguishes_absent_from_empty() {
        let end = remote::Pair { k: None, v: None, cursor_id: 0 };
        let empty = remote::Pair { k: Some(vec![]), v: Some(vec![]), cursor_id: 0 };
        assert!(end.k.is_none());
        assert_eq!(empty.k.as_deref(), Some(&[][..]));
    }
}
