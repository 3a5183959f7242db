//! Panicking assertions on [`ApiResponse`], reported with colored diffs.

use crate::response::ApiResponse;
use crate::subset::contains_subset;
use pretty_assertions::{assert_eq, Comparison};
use serde_json::Value;

impl ApiResponse {
    /// Assert the status code.
    #[track_caller]
    pub fn assert_status(&self, expected: u16) -> &Self {
        assert_eq!(self.status(), expected, "unexpected status for {} {}", self.method(), self.url());
        self
    }

    /// Assert the parsed body equals `expected`.
    #[track_caller]
    pub fn assert_body(&self, expected: impl Into<Value>) -> &Self {
        let expected = expected.into();
        assert_eq!(self.body(), &expected, "response body does not match");
        self
    }

    /// Assert the parsed body contains `expected` as a subset.
    #[track_caller]
    pub fn assert_body_contains(&self, expected: impl Into<Value>) -> &Self {
        let expected = expected.into();
        if !contains_subset(self.body(), &expected) {
            panic!(
                "expected response body to contain subset\n{}",
                Comparison::new(self.body(), &expected)
            );
        }
        self
    }

    /// Assert the parsed body does not contain `expected` as a subset.
    #[track_caller]
    pub fn assert_body_not_contains(&self, expected: impl Into<Value>) -> &Self {
        let expected = expected.into();
        if contains_subset(self.body(), &expected) {
            panic!(
                "expected response body not to contain subset {}\nbody: {:#}",
                expected,
                self.body()
            );
        }
        self
    }

    /// Assert a cookie was set, optionally with the given value.
    #[track_caller]
    pub fn assert_cookie(&self, name: &str, value: Option<&str>) -> &Self {
        let Some(cookie) = self.cookie(name) else {
            panic!(
                "expected response to set cookie {:?}, got {:?}",
                name,
                self.cookies().keys().collect::<Vec<_>>()
            );
        };
        if let Some(value) = value {
            assert_eq!(cookie.value.as_str(), value, "unexpected value for cookie {:?}", name);
        }
        self
    }

    /// Assert a cookie was not set.
    #[track_caller]
    pub fn assert_cookie_missing(&self, name: &str) -> &Self {
        if self.cookie(name).is_some() {
            panic!("expected response not to set cookie {:?}", name);
        }
        self
    }

    /// Assert a header is present, optionally with the given value.
    #[track_caller]
    pub fn assert_header(&self, name: &str, value: Option<&str>) -> &Self {
        if !self.headers().contains_key(name) {
            panic!(
                "expected response to have header {:?}, got {:?}",
                name,
                self.headers().keys().map(|k| k.as_str()).collect::<Vec<_>>()
            );
        }
        if let Some(value) = value {
            assert_eq!(self.header(name), Some(value), "unexpected value for header {:?}", name);
        }
        self
    }

    /// Assert a header is absent.
    #[track_caller]
    pub fn assert_header_missing(&self, name: &str) -> &Self {
        if let Some(value) = self.header(name) {
            panic!("expected response not to have header {:?}, found {:?}", name, value);
        }
        self
    }

    /// Assert the body text includes `expected`.
    #[track_caller]
    pub fn assert_text_includes(&self, expected: &str) -> &Self {
        if !self.text().contains(expected) {
            panic!("expected response text to include {:?}\ntext: {:?}", expected, self.text());
        }
        self
    }

    /// Assert one of the followed redirects went to `pathname`.
    #[track_caller]
    pub fn assert_redirects_to(&self, pathname: &str) -> &Self {
        let paths: Vec<&str> = self.redirects().iter().map(|url| url.path()).collect();
        if !paths.contains(&pathname) {
            panic!("expected {:?} to be one of {:?}", pathname, paths);
        }
        self
    }
}

macro_rules! status_assertions {
    ($($name:ident => $status:literal, $label:literal;)*) => {
        impl ApiResponse {
            $(
                #[doc = concat!("Assert a ", $label, " (", stringify!($status), ") status.")]
                #[track_caller]
                pub fn $name(&self) -> &Self {
                    self.assert_status($status)
                }
            )*
        }
    };
}

status_assertions! {
    assert_ok => 200, "ok";
    assert_created => 201, "created";
    assert_accepted => 202, "accepted";
    assert_no_content => 204, "no content";
    assert_moved_permanently => 301, "moved permanently";
    assert_found => 302, "found";
    assert_bad_request => 400, "bad request";
    assert_unauthorized => 401, "unauthorized";
    assert_payment_required => 402, "payment required";
    assert_forbidden => 403, "forbidden";
    assert_not_found => 404, "not found";
    assert_method_not_allowed => 405, "method not allowed";
    assert_not_acceptable => 406, "not acceptable";
    assert_request_timeout => 408, "request timeout";
    assert_conflict => 409, "conflict";
    assert_gone => 410, "gone";
    assert_length_required => 411, "length required";
    assert_precondition_failed => 412, "precondition failed";
    assert_payload_too_large => 413, "payload too large";
    assert_uri_too_long => 414, "URI too long";
    assert_unsupported_media_type => 415, "unsupported media type";
    assert_range_not_satisfiable => 416, "range not satisfiable";
    assert_im_a_teapot => 418, "I'm a teapot";
    assert_unprocessable_entity => 422, "unprocessable entity";
    assert_locked => 423, "locked";
    assert_too_many_requests => 429, "too many requests";
}
