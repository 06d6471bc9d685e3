//! Inbound request classification
//!
//! Requests are screened (identity and scheme) before any transaction
//! exists, then routed once the transaction layer has seen them. Both steps
//! are pure: they return a [`Disposition`] and the agent carries it out.

use super::message::{SipMethod, SipRequest};
use crate::domain::shared::value_objects::{DialogId, SessionKey, UriScheme};

/// What the agent must do with an inbound request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Disposition {
    /// Answer with a final response
    Reply {
        status_code: u16,
        reason: Option<&'static str>,
    },
    /// Nothing to send; `why` is logged
    Drop { why: &'static str },
    /// Deliver to `new_message` listeners and accept
    NewMessage,
    /// Create an incoming session and announce it
    NewSession,
    ToSession(SessionKey),
    ToDialog(DialogId),
}

impl Disposition {
    fn reply(status_code: u16) -> Self {
        Disposition::Reply {
            status_code,
            reason: None,
        }
    }
}

/// Where a request sits relative to existing dialogs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Inbound {
    /// No To tag
    Initial(SipMethod),
    /// To tag present
    InDialog(SipMethod),
}

impl Inbound {
    pub fn classify(request: &SipRequest) -> Option<Self> {
        let method = request.method()?;
        Some(match request.to_tag() {
            None => Inbound::Initial(method),
            Some(_) => Inbound::InDialog(method),
        })
    }
}

/// Read access to the agent's listeners and indices during routing
pub trait RoutingTable {
    fn accepts_messages(&self) -> bool;

    fn accepts_sessions(&self) -> bool;

    fn has_media(&self) -> bool;

    /// Dialog stored under either tag order
    fn find_dialog(&self, call_id: &str, from_tag: &str, to_tag: &str) -> Option<DialogId>;

    /// Session keyed by Call-ID plus either tag
    fn find_session(&self, call_id: &str, from_tag: &str, to_tag: &str) -> Option<SessionKey>;
}

/// Identity and scheme checks. `None` lets the request through.
pub fn screen(request: &SipRequest, identity_user: &str, contact_user: &str) -> Option<Disposition> {
    let is_ack = request.method() == Some(SipMethod::Ack);
    let user = request.uri_user();
    let user = user.as_deref();

    if user != Some(identity_user) && user != Some(contact_user) {
        return Some(if is_ack {
            Disposition::Drop {
                why: "ACK for another user",
            }
        } else {
            Disposition::reply(404)
        });
    }

    if request.uri_scheme() == Some(UriScheme::Sips) {
        return Some(if is_ack {
            Disposition::Drop {
                why: "ACK with sips Request-URI",
            }
        } else {
            Disposition::reply(416)
        });
    }

    None
}

/// Route a request that passed screening and the transaction layer
pub fn route<T: RoutingTable + ?Sized>(request: &SipRequest, table: &T) -> Disposition {
    let Some(inbound) = Inbound::classify(request) else {
        return Disposition::reply(405);
    };

    // Dialog-agnostic methods
    match inbound {
        Inbound::Initial(SipMethod::Options) | Inbound::InDialog(SipMethod::Options) => {
            return Disposition::reply(200);
        }
        Inbound::Initial(SipMethod::Message) | Inbound::InDialog(SipMethod::Message) => {
            if !table.accepts_messages() {
                return Disposition::reply(405);
            }
            return Disposition::NewMessage;
        }
        Inbound::Initial(SipMethod::Invite) | Inbound::InDialog(SipMethod::Invite)
            if !table.accepts_sessions() =>
        {
            return Disposition::reply(405);
        }
        _ => {}
    }

    let call_id = request.call_id().unwrap_or_default();
    let from_tag = request.from_tag().unwrap_or_default();
    let to_tag = request.to_tag().unwrap_or_default();

    match inbound {
        Inbound::Initial(SipMethod::Invite) => {
            if table.has_media() {
                Disposition::NewSession
            } else {
                Disposition::reply(488)
            }
        }
        Inbound::Initial(SipMethod::Bye) => Disposition::reply(481),
        Inbound::Initial(SipMethod::Cancel) => {
            match table.find_session(&call_id, &from_tag, &to_tag) {
                Some(key) => Disposition::ToSession(key),
                None => Disposition::Drop {
                    why: "CANCEL for an unknown session",
                },
            }
        }
        Inbound::Initial(SipMethod::Ack) => Disposition::Drop {
            why: "initial ACK",
        },
        Inbound::Initial(_) => Disposition::reply(405),
        Inbound::InDialog(method) => match table.find_dialog(&call_id, &from_tag, &to_tag) {
            Some(id) => Disposition::ToDialog(id),
            None => match method {
                SipMethod::Notify => match table.find_session(&call_id, &from_tag, &to_tag) {
                    Some(key) => Disposition::ToSession(key),
                    None => Disposition::Reply {
                        status_code: 481,
                        reason: Some("Subscription does not exist"),
                    },
                },
                SipMethod::Ack => Disposition::Drop {
                    why: "ACK for an unknown dialog",
                },
                _ => Disposition::Reply {
                    status_code: 481,
                    reason: None,
                },
            },
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::protocols::sip::message::tests::request;
    use std::collections::HashSet;

    const RURI: &str = "sip:alice@example.com";

    #[derive(Default)]
    struct Table {
        messages: bool,
        sessions: bool,
        media: bool,
        dialogs: HashSet<DialogId>,
        session_keys: HashSet<SessionKey>,
    }

    impl RoutingTable for Table {
        fn accepts_messages(&self) -> bool {
            self.messages
        }

        fn accepts_sessions(&self) -> bool {
            self.sessions
        }

        fn has_media(&self) -> bool {
            self.media
        }

        fn find_dialog(&self, call_id: &str, from_tag: &str, to_tag: &str) -> Option<DialogId> {
            let id = DialogId::new(call_id, from_tag, to_tag);
            [id.clone(), id.swapped()]
                .into_iter()
                .find(|id| self.dialogs.contains(id))
        }

        fn find_session(&self, call_id: &str, from_tag: &str, to_tag: &str) -> Option<SessionKey> {
            [SessionKey::new(call_id, from_tag), SessionKey::new(call_id, to_tag)]
                .into_iter()
                .find(|key| self.session_keys.contains(key))
        }
    }

    fn reply(status_code: u16) -> Disposition {
        Disposition::Reply {
            status_code,
            reason: None,
        }
    }

    #[test]
    fn test_screen_foreign_user() {
        let req = request("INVITE", "sip:carol@example.com", "z9hG4bK1", "f", None);
        assert_eq!(screen(&req, "alice", "k3x9q2ab"), Some(reply(404)));

        let ack = request("ACK", "sip:carol@example.com", "z9hG4bK1", "f", None);
        assert!(matches!(
            screen(&ack, "alice", "k3x9q2ab"),
            Some(Disposition::Drop { .. })
        ));
    }

    #[test]
    fn test_screen_accepts_contact_user_and_rejects_sips() {
        let req = request("OPTIONS", "sip:k3x9q2ab@abc.invalid", "z9hG4bK1", "f", None);
        assert_eq!(screen(&req, "alice", "k3x9q2ab"), None);

        let req = request("OPTIONS", "sips:alice@example.com", "z9hG4bK1", "f", None);
        assert_eq!(screen(&req, "alice", "k3x9q2ab"), Some(reply(416)));
    }

    #[test]
    fn test_options_answered() {
        let req = request("OPTIONS", RURI, "z9hG4bK1", "f", None);
        assert_eq!(route(&req, &Table::default()), reply(200));
    }

    #[test]
    fn test_message_requires_listener() {
        let req = request("MESSAGE", RURI, "z9hG4bK1", "f", None);
        assert_eq!(route(&req, &Table::default()), reply(405));

        let table = Table {
            messages: true,
            ..Default::default()
        };
        assert_eq!(route(&req, &table), Disposition::NewMessage);
    }

    #[test]
    fn test_initial_invite() {
        let req = request("INVITE", RURI, "z9hG4bK1", "f", None);
        assert_eq!(route(&req, &Table::default()), reply(405));

        let table = Table {
            sessions: true,
            ..Default::default()
        };
        assert_eq!(route(&req, &table), reply(488));

        let table = Table {
            sessions: true,
            media: true,
            ..Default::default()
        };
        assert_eq!(route(&req, &table), Disposition::NewSession);
    }

    #[test]
    fn test_initial_requests_without_dialog() {
        let table = Table::default();
        let bye = request("BYE", RURI, "z9hG4bK1", "f", None);
        assert_eq!(route(&bye, &table), reply(481));

        let ack = request("ACK", RURI, "z9hG4bK1", "f", None);
        assert!(matches!(route(&ack, &table), Disposition::Drop { .. }));

        let info = request("INFO", RURI, "z9hG4bK1", "f", None);
        assert_eq!(route(&info, &table), reply(405));

        let cancel = request("CANCEL", RURI, "z9hG4bK1", "f", None);
        assert!(matches!(route(&cancel, &table), Disposition::Drop { .. }));
    }

    #[test]
    fn test_cancel_reaches_session() {
        let mut table = Table::default();
        table
            .session_keys
            .insert(SessionKey::new("a84b4c76e66710", "f"));
        let cancel = request("CANCEL", RURI, "z9hG4bK1", "f", None);
        assert_eq!(
            route(&cancel, &table),
            Disposition::ToSession(SessionKey::new("a84b4c76e66710", "f"))
        );
    }

    #[test]
    fn test_dialog_lookup_is_symmetric() {
        let mut table = Table::default();
        table
            .dialogs
            .insert(DialogId::new("a84b4c76e66710", "tagA", "tagB"));

        let forward = request("BYE", RURI, "z9hG4bK1", "tagA", Some("tagB"));
        let reverse = request("BYE", RURI, "z9hG4bK2", "tagB", Some("tagA"));
        assert!(matches!(route(&forward, &table), Disposition::ToDialog(_)));
        assert!(matches!(route(&reverse, &table), Disposition::ToDialog(_)));
    }

    #[test]
    fn test_in_dialog_without_dialog() {
        let table = Table::default();
        let notify = request("NOTIFY", RURI, "z9hG4bK1", "f", Some("t"));
        assert_eq!(
            route(&notify, &table),
            Disposition::Reply {
                status_code: 481,
                reason: Some("Subscription does not exist")
            }
        );

        let ack = request("ACK", RURI, "z9hG4bK1", "f", Some("t"));
        assert!(matches!(route(&ack, &table), Disposition::Drop { .. }));

        let info = request("INFO", RURI, "z9hG4bK1", "f", Some("t"));
        assert_eq!(route(&info, &table), reply(481));
    }

    #[test]
    fn test_notify_falls_back_to_session() {
        let mut table = Table::default();
        table
            .session_keys
            .insert(SessionKey::new("a84b4c76e66710", "t"));
        let notify = request("NOTIFY", RURI, "z9hG4bK1", "f", Some("t"));
        assert_eq!(
            route(&notify, &table),
            Disposition::ToSession(SessionKey::new("a84b4c76e66710", "t"))
        );
    }
}
