//! SIP response builder

use super::message::SipRequest;
use rsip::Header;

/// Default reason phrase for the status codes this agent produces
pub fn reason_phrase(status_code: u16) -> &'static str {
    match status_code {
        100 => "Trying",
        180 => "Ringing",
        200 => "OK",
        404 => "Not Found",
        405 => "Method Not Allowed",
        416 => "Unsupported URI Scheme",
        481 => "Call/Transaction Does Not Exist",
        487 => "Request Terminated",
        488 => "Not Acceptable Here",
        500 => "Internal Server Error",
        _ => "Unknown",
    }
}

/// Build the wire text of a response to a received request
pub struct ResponseBuilder {
    status_code: u16,
    reason: Option<String>,
    to_tag: Option<String>,
    headers: Vec<(String, String)>,
    body: String,
}

impl ResponseBuilder {
    pub fn new(status_code: u16) -> Self {
        Self {
            status_code,
            reason: None,
            to_tag: None,
            headers: Vec::new(),
            body: String::new(),
        }
    }

    pub fn ok() -> Self {
        Self::new(200)
    }

    pub fn reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Tag added to the To header when the request carries none
    pub fn to_tag(mut self, tag: impl Into<String>) -> Self {
        self.to_tag = Some(tag.into());
        self
    }

    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    pub fn body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    pub fn status_code(&self) -> u16 {
        self.status_code
    }

    pub fn build_for_request(self, request: &SipRequest) -> String {
        let reason = self
            .reason
            .unwrap_or_else(|| reason_phrase(self.status_code).to_string());
        let mut text = format!("SIP/2.0 {} {}\r\n", self.status_code, reason);

        // Copy essential headers from request
        let needs_tag = request.to_tag().is_none() && self.status_code > 100;
        for header in request.inner.headers.iter() {
            match header {
                Header::Via(_) | Header::From(_) | Header::CallId(_) | Header::CSeq(_) => {
                    text.push_str(&format!("{}\r\n", header));
                }
                Header::To(to) => match (&self.to_tag, needs_tag) {
                    (Some(tag), true) => text.push_str(&format!("{};tag={}\r\n", to, tag)),
                    _ => text.push_str(&format!("{}\r\n", to)),
                },
                _ => {}
            }
        }

        for (name, value) in &self.headers {
            text.push_str(&format!("{}: {}\r\n", name, value));
        }

        text.push_str(&format!("Content-Length: {}\r\n\r\n", self.body.len()));
        text.push_str(&self.body);
        text
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::protocols::sip::message::tests::request;
    use crate::infrastructure::protocols::sip::message::SipResponse;

    #[test]
    fn test_build_adds_to_tag_and_copies_headers() {
        let req = request("BYE", "sip:alice@example.com", "z9hG4bK42", "abc", None);
        let text = ResponseBuilder::new(481).to_tag("xyz").build_for_request(&req);

        assert!(text.starts_with("SIP/2.0 481 Call/Transaction Does Not Exist\r\n"));
        assert!(text.contains(";tag=xyz"));

        let resp = SipResponse::parse(text.as_bytes()).unwrap();
        assert_eq!(resp.status_code(), 481);
        assert_eq!(resp.branch(), Some("z9hG4bK42".to_string()));
        assert_eq!(resp.call_id(), Some("a84b4c76e66710".to_string()));
    }

    #[test]
    fn test_existing_to_tag_is_kept() {
        let req = request("NOTIFY", "sip:alice@example.com", "z9hG4bK43", "abc", Some("def"));
        let text = ResponseBuilder::new(481)
            .reason("Subscription does not exist")
            .to_tag("xyz")
            .build_for_request(&req);

        assert!(text.starts_with("SIP/2.0 481 Subscription does not exist\r\n"));
        assert!(text.contains(";tag=def"));
        assert!(!text.contains("xyz"));
    }
}
