//! Topic parsing and addressing for the `REQ`/`RESP`/`SYNC` grammar.
//!
//! Inbound requests arrive on `REQ/<recipient>/<service>[/<request_id>]`.
//! Responses go out on `RESP/<hostname>/<service>/<request_id>/<stage>/<format>`.

use crate::constants::{BROADCAST_RECIPIENT, REQUEST_PREFIX, RESPONSE_PREFIX, SYNC_PREFIX};
use crate::types::{ActorIdentity, ResponseFormat, Stage};

/// Routing decision for one inbound topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    /// A request addressed to this actor.
    Addressed {
        recipient: String,
        /// Correlation id from the topic, if the requester supplied one.
        request_id: Option<String>,
    },
    /// A well-formed request aimed at a peer host sharing the broker.
    /// Routine filtering, not an error; dropped without a response.
    NotAddressed { recipient: String },
    /// Anything that does not parse as a request for this service.
    /// Dropped without a response (there is no request id to answer on).
    Malformed,
}

/// Parses inbound topics and derives the outbound topic family for one
/// actor identity.
#[derive(Debug, Clone)]
pub struct TopicRouter {
    identity: ActorIdentity,
}

impl TopicRouter {
    pub fn new(identity: ActorIdentity) -> Self {
        Self { identity }
    }

    pub fn identity(&self) -> &ActorIdentity {
        &self.identity
    }

    /// Topic filters this actor's transport should subscribe to: the
    /// broadcast family and the host-targeted family.
    pub fn subscription_filters(&self) -> [String; 2] {
        [
            format!(
                "{REQUEST_PREFIX}/{BROADCAST_RECIPIENT}/{}/#",
                self.identity.service_name
            ),
            format!(
                "{REQUEST_PREFIX}/{}/{}/#",
                self.identity.hostname, self.identity.service_name
            ),
        ]
    }

    /// Classify an inbound topic against this actor's identity.
    pub fn route(&self, topic: &str) -> Route {
        let parts: Vec<&str> = topic.split('/').collect();
        if parts.len() < 3 || parts.len() > 4 || parts.iter().any(|p| p.is_empty()) {
            return Route::Malformed;
        }
        if parts[0] != REQUEST_PREFIX || parts[2] != self.identity.service_name {
            return Route::Malformed;
        }

        let recipient = parts[1].to_string();
        let request_id = parts.get(3).map(|id| id.to_string());

        if recipient != BROADCAST_RECIPIENT && recipient != self.identity.hostname {
            return Route::NotAddressed { recipient };
        }

        Route::Addressed {
            recipient,
            request_id,
        }
    }

    /// Topic for one published response artifact.
    pub fn response_topic(&self, request_id: &str, stage: Stage, format: ResponseFormat) -> String {
        format!(
            "{RESPONSE_PREFIX}/{}/{}/{request_id}/{}/{}",
            self.identity.hostname,
            self.identity.service_name,
            stage.as_str(),
            format.as_str()
        )
    }

    /// Side-channel topic announcing that an artifact became available.
    pub fn sync_topic(&self) -> String {
        format!(
            "{SYNC_PREFIX}/{host}@{host}:",
            host = self.identity.hostname
        )
    }
}

/// Match a concrete topic against an MQTT-style filter.
///
/// `#` matches any remaining segments and must be the last filter segment;
/// `+` matches exactly one segment.
pub fn filter_matches(filter: &str, topic: &str) -> bool {
    let mut filter_parts = filter.split('/');
    let mut topic_parts = topic.split('/');

    loop {
        match (filter_parts.next(), topic_parts.next()) {
            (Some("#"), _) => return filter_parts.next().is_none(),
            (Some("+"), Some(_)) => continue,
            (Some(f), Some(t)) if f == t => continue,
            (None, None) => return true,
            _ => return false,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn router() -> TopicRouter {
        TopicRouter::new(ActorIdentity::new("myhost", "example-service"))
    }

    #[test]
    fn broadcast_request_is_addressed() {
        assert_eq!(
            router().route("REQ/ALL/example-service"),
            Route::Addressed {
                recipient: "ALL".to_string(),
                request_id: None,
            }
        );
    }

    #[test]
    fn targeted_request_carries_its_id() {
        assert_eq!(
            router().route("REQ/myhost/example-service/abc123"),
            Route::Addressed {
                recipient: "myhost".to_string(),
                request_id: Some("abc123".to_string()),
            }
        );
    }

    #[test]
    fn request_for_peer_host_is_not_addressed() {
        assert_eq!(
            router().route("REQ/otherhost/example-service"),
            Route::NotAddressed {
                recipient: "otherhost".to_string()
            }
        );
    }

    #[test]
    fn malformed_topics_are_rejected() {
        let router = router();
        for topic in [
            "REQ/ALL",
            "REQ/ALL/example-service/id/extra",
            "RESP/myhost/example-service/abc/ACK/JSON",
            "REQ/ALL/other-service",
            "REQ/ALL/example-service/",
            "REQ//example-service",
            "",
        ] {
            assert_eq!(router.route(topic), Route::Malformed, "topic: {topic:?}");
        }
    }

    #[test]
    fn subscription_filters_cover_broadcast_and_host() {
        assert_eq!(
            router().subscription_filters(),
            [
                "REQ/ALL/example-service/#".to_string(),
                "REQ/myhost/example-service/#".to_string(),
            ]
        );
    }

    #[test]
    fn response_topic_shape() {
        assert_eq!(
            router().response_topic("abc123", Stage::Ack, ResponseFormat::Json),
            "RESP/myhost/example-service/abc123/ACK/JSON"
        );
        assert_eq!(
            router().response_topic("abc123", Stage::Result, ResponseFormat::Symbolic),
            "RESP/myhost/example-service/abc123/RESULT/SYMBOLIC"
        );
    }

    #[test]
    fn sync_topic_shape() {
        assert_eq!(router().sync_topic(), "SYNC/myhost@myhost:");
    }

    #[test]
    fn filter_matching() {
        assert!(filter_matches(
            "REQ/ALL/example-service/#",
            "REQ/ALL/example-service"
        ));
        assert!(filter_matches(
            "REQ/ALL/example-service/#",
            "REQ/ALL/example-service/abc123"
        ));
        assert!(filter_matches("RESP/#", "RESP/myhost/svc/abc/ACK/JSON"));
        assert!(filter_matches("REQ/+/svc", "REQ/anyhost/svc"));
        assert!(!filter_matches("REQ/+/svc", "REQ/anyhost/svc/extra"));
        assert!(!filter_matches(
            "REQ/ALL/example-service/#",
            "REQ/ALL/other-service/abc123"
        ));
        assert!(!filter_matches("REQ/ALL/svc", "REQ/ALL"));
    }
}
