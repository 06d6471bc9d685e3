//! SIP message types and parsing

use crate::domain::shared::value_objects::UriScheme;
use bytes::Bytes;
use rsip::prelude::{HeadersExt, ToTypedHeader, UntypedHeader};
use rsip::{Param, Request, Response, Scheme};
use std::fmt;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SipError {
    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Invalid message: {0}")]
    InvalidMessage(String),
}

impl From<rsip::Error> for SipError {
    fn from(err: rsip::Error) -> Self {
        SipError::ParseError(err.to_string())
    }
}

/// SIP method types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SipMethod {
    Register,
    Invite,
    Ack,
    Cancel,
    Bye,
    Options,
    Info,
    Update,
    Prack,
    Subscribe,
    Notify,
    Refer,
    Message,
    Publish,
}

impl SipMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            SipMethod::Register => "REGISTER",
            SipMethod::Invite => "INVITE",
            SipMethod::Ack => "ACK",
            SipMethod::Cancel => "CANCEL",
            SipMethod::Bye => "BYE",
            SipMethod::Options => "OPTIONS",
            SipMethod::Info => "INFO",
            SipMethod::Update => "UPDATE",
            SipMethod::Prack => "PRACK",
            SipMethod::Subscribe => "SUBSCRIBE",
            SipMethod::Notify => "NOTIFY",
            SipMethod::Refer => "REFER",
            SipMethod::Message => "MESSAGE",
            SipMethod::Publish => "PUBLISH",
        }
    }

    pub fn parse(method: &str) -> Option<Self> {
        let method = match method.trim().to_ascii_uppercase().as_str() {
            "REGISTER" => SipMethod::Register,
            "INVITE" => SipMethod::Invite,
            "ACK" => SipMethod::Ack,
            "CANCEL" => SipMethod::Cancel,
            "BYE" => SipMethod::Bye,
            "OPTIONS" => SipMethod::Options,
            "INFO" => SipMethod::Info,
            "UPDATE" => SipMethod::Update,
            "PRACK" => SipMethod::Prack,
            "SUBSCRIBE" => SipMethod::Subscribe,
            "NOTIFY" => SipMethod::Notify,
            "REFER" => SipMethod::Refer,
            "MESSAGE" => SipMethod::Message,
            "PUBLISH" => SipMethod::Publish,
            _ => return None,
        };
        Some(method)
    }
}

impl fmt::Display for SipMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Method named in a CSeq header
fn cseq_method<T: HeadersExt>(message: &T) -> Option<SipMethod> {
    let cseq = message.cseq_header().ok()?.typed().ok()?;
    SipMethod::parse(&cseq.method.to_string())
}

/// Branch of the top-most Via
fn top_branch<T: HeadersExt>(message: &T) -> Option<String> {
    let via = message.via_header().ok()?.typed().ok()?;
    via.params.iter().find_map(|param| match param {
        Param::Branch(branch) => Some(branch.to_string()),
        _ => None,
    })
}

fn call_id<T: HeadersExt>(message: &T) -> Option<String> {
    message
        .call_id_header()
        .ok()
        .map(|call_id| call_id.value().to_string())
}

/// SIP Request wrapper
#[derive(Debug, Clone)]
pub struct SipRequest {
    pub inner: Request,
}

impl SipRequest {
    pub fn new(inner: Request) -> Self {
        Self { inner }
    }

    pub fn parse(data: &[u8]) -> Result<Self, SipError> {
        let request = rsip::Request::try_from(data)?;
        Ok(Self::new(request))
    }

    pub fn method(&self) -> Option<SipMethod> {
        SipMethod::parse(&self.inner.method.to_string())
    }

    /// Request-URI as sent
    pub fn uri(&self) -> String {
        self.inner.uri.to_string()
    }

    /// Request-URI scheme, if it is a SIP URI at all
    pub fn uri_scheme(&self) -> Option<UriScheme> {
        match self.inner.uri.scheme.as_ref()? {
            Scheme::Sip => Some(UriScheme::Sip),
            Scheme::Sips => Some(UriScheme::Sips),
            _ => None,
        }
    }

    /// User part of the Request-URI
    pub fn uri_user(&self) -> Option<String> {
        self.inner
            .uri
            .auth
            .as_ref()
            .map(|auth| auth.user.clone())
            .filter(|user| !user.is_empty())
    }

    pub fn body(&self) -> &[u8] {
        &self.inner.body
    }

    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.inner.body).into_owned()
    }

    pub fn call_id(&self) -> Option<String> {
        call_id(&self.inner)
    }

    /// From header value as received
    pub fn from(&self) -> Option<String> {
        self.inner
            .from_header()
            .ok()
            .map(|from| from.value().to_string())
    }

    pub fn from_tag(&self) -> Option<String> {
        let tag = self.inner.from_header().ok()?.tag().ok()??;
        Some(tag.to_string())
    }

    pub fn to_tag(&self) -> Option<String> {
        let tag = self.inner.to_header().ok()?.tag().ok()??;
        Some(tag.to_string())
    }

    /// Branch of the top-most Via
    pub fn branch(&self) -> Option<String> {
        top_branch(&self.inner)
    }

    pub fn cseq_method(&self) -> Option<SipMethod> {
        cseq_method(&self.inner)
    }

    pub fn to_bytes(&self) -> Bytes {
        Bytes::from(self.inner.to_string())
    }
}

/// SIP Response wrapper
#[derive(Debug, Clone)]
pub struct SipResponse {
    pub inner: Response,
}

impl SipResponse {
    pub fn new(inner: Response) -> Self {
        Self { inner }
    }

    pub fn parse(data: &[u8]) -> Result<Self, SipError> {
        let response = rsip::Response::try_from(data)?;
        Ok(Self::new(response))
    }

    pub fn status_code(&self) -> u16 {
        self.inner.status_code.clone().into()
    }

    pub fn call_id(&self) -> Option<String> {
        call_id(&self.inner)
    }

    pub fn branch(&self) -> Option<String> {
        top_branch(&self.inner)
    }

    pub fn cseq_method(&self) -> Option<SipMethod> {
        cseq_method(&self.inner)
    }

    pub fn body(&self) -> &[u8] {
        &self.inner.body
    }

    pub fn to_bytes(&self) -> Bytes {
        Bytes::from(self.inner.to_string())
    }
}

/// SIP Message (either request or response)
#[derive(Debug, Clone)]
pub enum SipMessage {
    Request(SipRequest),
    Response(SipResponse),
}

impl SipMessage {
    pub fn parse(data: &[u8]) -> Result<Self, SipError> {
        if data.starts_with(b"SIP/") {
            return SipResponse::parse(data).map(SipMessage::Response);
        }
        SipRequest::parse(data).map(SipMessage::Request)
    }

    pub fn is_request(&self) -> bool {
        matches!(self, SipMessage::Request(_))
    }

    pub fn is_response(&self) -> bool {
        matches!(self, SipMessage::Response(_))
    }

    pub fn as_request(&self) -> Option<&SipRequest> {
        match self {
            SipMessage::Request(req) => Some(req),
            _ => None,
        }
    }

    pub fn as_response(&self) -> Option<&SipResponse> {
        match self {
            SipMessage::Response(resp) => Some(resp),
            _ => None,
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Request text with the given method, Request-URI and tags
    pub(crate) fn request_text(
        method: &str,
        ruri: &str,
        branch: &str,
        from_tag: &str,
        to_tag: Option<&str>,
    ) -> String {
        let to_tag = to_tag.map(|t| format!(";tag={}", t)).unwrap_or_default();
        format!(
            "{method} {ruri} SIP/2.0\r\n\
             Via: SIP/2.0/WSS df7jal23ls0d.invalid;branch={branch}\r\n\
             Max-Forwards: 69\r\n\
             From: <sip:bob@example.com>;tag={from_tag}\r\n\
             To: <{ruri}>{to_tag}\r\n\
             Call-ID: a84b4c76e66710\r\n\
             CSeq: 1 {method}\r\n\
             Content-Length: 0\r\n\r\n"
        )
    }

    pub(crate) fn request(
        method: &str,
        ruri: &str,
        branch: &str,
        from_tag: &str,
        to_tag: Option<&str>,
    ) -> SipRequest {
        SipRequest::parse(request_text(method, ruri, branch, from_tag, to_tag).as_bytes()).unwrap()
    }

    #[test]
    fn test_parse_invite_request() {
        let req = request(
            "INVITE",
            "sip:alice@example.com",
            "z9hG4bK776asdhds",
            "1928301774",
            None,
        );

        assert_eq!(req.method(), Some(SipMethod::Invite));
        assert_eq!(req.call_id(), Some("a84b4c76e66710".to_string()));
        assert_eq!(req.from_tag(), Some("1928301774".to_string()));
        assert_eq!(req.to_tag(), None);
        assert_eq!(req.branch(), Some("z9hG4bK776asdhds".to_string()));
        assert_eq!(req.cseq_method(), Some(SipMethod::Invite));
        assert_eq!(req.uri_user(), Some("alice".to_string()));
        assert_eq!(req.uri_scheme(), Some(UriScheme::Sip));
    }

    #[test]
    fn test_in_dialog_request_has_to_tag() {
        let req = request("BYE", "sip:alice@example.com", "z9hG4bK1", "a", Some("b"));
        assert_eq!(req.method(), Some(SipMethod::Bye));
        assert_eq!(req.to_tag(), Some("b".to_string()));
    }

    #[test]
    fn test_parse_response() {
        let data = b"SIP/2.0 200 OK\r\n\
                     Via: SIP/2.0/WSS 192.0.2.7;branch=z9hG4bK776asdhds\r\n\
                     From: Alice <sip:alice@example.com>;tag=1928301774\r\n\
                     To: Alice <sip:alice@example.com>;tag=a6c85cf\r\n\
                     Call-ID: a84b4c76e66710@pc33.example.com\r\n\
                     CSeq: 314159 REGISTER\r\n\
                     Content-Length: 0\r\n\r\n";

        let msg = SipMessage::parse(data).unwrap();
        assert!(msg.is_response());

        let resp = msg.as_response().unwrap();
        assert_eq!(resp.status_code(), 200);
        assert_eq!(resp.branch(), Some("z9hG4bK776asdhds".to_string()));
        assert_eq!(resp.cseq_method(), Some(SipMethod::Register));
    }

    #[test]
    fn test_tags_ignore_uri_parameters() {
        let data = "OPTIONS sip:alice@example.com;transport=ws SIP/2.0\r\n\
                    Via: SIP/2.0/WSS df7jal23ls0d.invalid;rport;branch=z9hG4bKouter\r\n\
                    Via: SIP/2.0/WSS proxy.example.com;branch=z9hG4bKinner\r\n\
                    From: <sip:bob@example.com;tag=inner>;tag=outer\r\n\
                    To: <sip:alice@example.com;tag=uri>\r\n\
                    Call-ID: 6nm8vq3d2e\r\n\
                    CSeq: 7 OPTIONS\r\n\
                    Content-Length: 0\r\n\r\n";
        let req = SipRequest::parse(data.as_bytes()).unwrap();

        assert_eq!(req.from_tag(), Some("outer".to_string()));
        assert_eq!(req.to_tag(), None);
        assert_eq!(req.branch(), Some("z9hG4bKouter".to_string()));
        assert_eq!(req.call_id(), Some("6nm8vq3d2e".to_string()));
        assert_eq!(req.cseq_method(), Some(SipMethod::Options));
        assert_eq!(req.uri_user(), Some("alice".to_string()));
    }

    #[test]
    fn test_sips_request_uri_without_user() {
        let req = request("OPTIONS", "sips:example.com", "z9hG4bK9", "a", None);
        assert_eq!(req.uri_scheme(), Some(UriScheme::Sips));
        assert_eq!(req.uri_user(), None);
    }

    #[test]
    fn test_method_parse() {
        assert_eq!(SipMethod::parse("notify"), Some(SipMethod::Notify));
        assert_eq!(SipMethod::parse("PRACK"), Some(SipMethod::Prack));
        assert_eq!(SipMethod::parse("FOO"), None);
    }
}
