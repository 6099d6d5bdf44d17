//! Failure classification into stable `(code, retryable)` pairs.
//!
//! Every family evaluates its rules in the same order: rate limiting first,
//! then not-found/auth (and parse for feeds), then connection/timeout/server,
//! then the non-retryable `COLLECTION_ERROR` fallback. The first matching
//! rule wins.
//!
//! A categorized failure is decided by its `ErrorKind`. Message phrases only
//! classify `ErrorKind::Other`, with one exception: a 401 that carries wait
//! language is rate limiting.

use crate::error::ErrorKind;
use crate::models::SourceType;

pub const RATE_LIMIT_ERROR: &str = "RATE_LIMIT_ERROR";
pub const PROFILE_NOT_FOUND_ERROR: &str = "PROFILE_NOT_FOUND_ERROR";
pub const FEED_NOT_FOUND_ERROR: &str = "FEED_NOT_FOUND_ERROR";
pub const AUTH_ERROR: &str = "AUTH_ERROR";
pub const FEED_ACCESS_DENIED_ERROR: &str = "FEED_ACCESS_DENIED_ERROR";
pub const CLIENT_NOT_CONNECTED_ERROR: &str = "CLIENT_NOT_CONNECTED_ERROR";
pub const CONNECTION_ERROR: &str = "CONNECTION_ERROR";
pub const TIMEOUT_ERROR: &str = "TIMEOUT_ERROR";
pub const PARSE_ERROR: &str = "PARSE_ERROR";
pub const SERVER_ERROR: &str = "SERVER_ERROR";
pub const COLLECTION_ERROR: &str = "COLLECTION_ERROR";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification {
    pub code: &'static str,
    pub retryable: bool,
}

enum Matcher {
    Kind(ErrorKind),
    /// Any HTTP status in the inclusive range.
    Status(u16, u16),
    /// The kind matches and at least one phrase appears in the message.
    KindPhrase(ErrorKind, &'static [&'static str]),
    Phrase(&'static str),
    /// `first` and at least one of `any` appear in the message.
    Together(&'static str, &'static [&'static str]),
}

impl Matcher {
    fn matches(&self, kind: ErrorKind, message: &str) -> bool {
        match self {
            Matcher::Kind(k) => *k == kind,
            Matcher::Status(lo, hi) => matches!(kind, ErrorKind::Http(s) if (*lo..=*hi).contains(&s)),
            Matcher::KindPhrase(k, any) => *k == kind && any.iter().any(|p| message.contains(p)),
            Matcher::Phrase(p) => kind == ErrorKind::Other && message.contains(p),
            Matcher::Together(first, any) => {
                kind == ErrorKind::Other && message.contains(first) && any.iter().any(|p| message.contains(p))
            }
        }
    }
}

struct Rule {
    code: &'static str,
    retryable: bool,
    when: &'static [Matcher],
}

const WAIT_PHRASES: &[&str] = &["wait", "try again", "few minutes"];

/// Upstreams answer rate limiting with a 401 and wait language.
const RATE_LIMITED_AUTH: Matcher = Matcher::KindPhrase(ErrorKind::AuthRequired, WAIT_PHRASES);
const RATE_LIMITED_401: Matcher = Matcher::Together("401", WAIT_PHRASES);

const INSTAGRAM_RULES: &[Rule] = &[
    Rule {
        code: RATE_LIMIT_ERROR,
        retryable: true,
        when: &[
            Matcher::Kind(ErrorKind::RateLimited),
            RATE_LIMITED_AUTH,
            RATE_LIMITED_401,
            Matcher::Phrase("rate limit"),
            Matcher::Phrase("please wait"),
            Matcher::Phrase("wait a few minutes"),
            Matcher::Phrase("try again"),
        ],
    },
    Rule {
        code: PROFILE_NOT_FOUND_ERROR,
        retryable: false,
        when: &[
            Matcher::Kind(ErrorKind::NotFound),
            Matcher::Phrase("not found"),
            Matcher::Phrase("does not exist"),
        ],
    },
    Rule {
        code: AUTH_ERROR,
        retryable: false,
        when: &[
            Matcher::Kind(ErrorKind::AuthRequired),
            Matcher::Kind(ErrorKind::AccessDenied),
            Matcher::Phrase("login required"),
            Matcher::Phrase("authentication"),
        ],
    },
    Rule {
        code: TIMEOUT_ERROR,
        retryable: true,
        when: &[
            Matcher::Kind(ErrorKind::Timeout),
            Matcher::Phrase("timeout"),
            Matcher::Phrase("timed out"),
            Matcher::Phrase("etimedout"),
        ],
    },
    Rule {
        code: CLIENT_NOT_CONNECTED_ERROR,
        retryable: true,
        when: &[
            Matcher::Kind(ErrorKind::Connection),
            Matcher::Status(500, 599),
            Matcher::Phrase("connection"),
            Matcher::Phrase("network"),
            Matcher::Phrase("econnrefused"),
        ],
    },
];

const TWITTER_RULES: &[Rule] = &[
    Rule {
        code: RATE_LIMIT_ERROR,
        retryable: true,
        when: &[
            Matcher::Kind(ErrorKind::RateLimited),
            RATE_LIMITED_AUTH,
            RATE_LIMITED_401,
            Matcher::Phrase("rate limit"),
            Matcher::Phrase("too many requests"),
            Matcher::Phrase("429"),
        ],
    },
    Rule {
        code: PROFILE_NOT_FOUND_ERROR,
        retryable: false,
        when: &[
            Matcher::Kind(ErrorKind::NotFound),
            Matcher::Phrase("not found"),
            Matcher::Phrase("404"),
        ],
    },
    Rule {
        code: AUTH_ERROR,
        retryable: false,
        when: &[
            Matcher::Kind(ErrorKind::AuthRequired),
            Matcher::Kind(ErrorKind::AccessDenied),
            Matcher::Phrase("401"),
            Matcher::Phrase("unauthorized"),
            Matcher::Phrase("authentication"),
            Matcher::Phrase("login required"),
        ],
    },
    Rule {
        code: TIMEOUT_ERROR,
        retryable: true,
        when: &[
            Matcher::Kind(ErrorKind::Timeout),
            Matcher::Phrase("timeout"),
            Matcher::Phrase("timed out"),
            Matcher::Phrase("etimedout"),
        ],
    },
    Rule {
        code: CONNECTION_ERROR,
        retryable: true,
        when: &[
            Matcher::Kind(ErrorKind::Connection),
            Matcher::Phrase("connection"),
            Matcher::Phrase("network"),
            Matcher::Phrase("econnrefused"),
        ],
    },
    Rule {
        code: SERVER_ERROR,
        retryable: true,
        when: &[
            Matcher::Status(500, 599),
            Matcher::Phrase("500"),
            Matcher::Phrase("502"),
            Matcher::Phrase("503"),
        ],
    },
];

const RSS_RULES: &[Rule] = &[
    Rule {
        code: RATE_LIMIT_ERROR,
        retryable: true,
        when: &[
            Matcher::Kind(ErrorKind::RateLimited),
            RATE_LIMITED_AUTH,
            RATE_LIMITED_401,
            Matcher::Phrase("rate limit"),
            Matcher::Phrase("429"),
        ],
    },
    Rule {
        code: FEED_NOT_FOUND_ERROR,
        retryable: false,
        when: &[
            Matcher::Kind(ErrorKind::NotFound),
            Matcher::Phrase("404"),
            Matcher::Phrase("not found"),
        ],
    },
    Rule {
        code: FEED_ACCESS_DENIED_ERROR,
        retryable: false,
        when: &[
            Matcher::Kind(ErrorKind::AuthRequired),
            Matcher::Kind(ErrorKind::AccessDenied),
            Matcher::Phrase("401"),
            Matcher::Phrase("403"),
            Matcher::Phrase("forbidden"),
        ],
    },
    Rule {
        code: PARSE_ERROR,
        retryable: false,
        when: &[
            Matcher::Kind(ErrorKind::Parse),
            Matcher::Phrase("parse error"),
            Matcher::Phrase("failed to parse"),
            Matcher::Phrase("malformed"),
            Matcher::Phrase("invalid url"),
        ],
    },
    Rule {
        code: TIMEOUT_ERROR,
        retryable: true,
        when: &[
            Matcher::Kind(ErrorKind::Timeout),
            Matcher::Phrase("timeout"),
            Matcher::Phrase("timed out"),
            Matcher::Phrase("etimedout"),
        ],
    },
    Rule {
        code: CONNECTION_ERROR,
        retryable: true,
        when: &[
            Matcher::Kind(ErrorKind::Connection),
            Matcher::Phrase("connection"),
            Matcher::Phrase("network"),
            Matcher::Phrase("econnrefused"),
        ],
    },
    Rule {
        code: SERVER_ERROR,
        retryable: true,
        when: &[
            Matcher::Status(500, 599),
            Matcher::Phrase("500"),
            Matcher::Phrase("502"),
            Matcher::Phrase("503"),
            Matcher::Phrase("temporarily"),
        ],
    },
];

fn rules_for(family: SourceType) -> &'static [Rule] {
    match family {
        SourceType::Instagram => INSTAGRAM_RULES,
        SourceType::Twitter => TWITTER_RULES,
        SourceType::Rss => RSS_RULES,
    }
}

/// Classify a failure reported by a `family` worker.
pub fn classify(family: SourceType, kind: ErrorKind, message: &str) -> Classification {
    let message = message.to_lowercase();
    rules_for(family)
        .iter()
        .find(|rule| rule.when.iter().any(|m| m.matches(kind, &message)))
        .map(|rule| Classification {
            code: rule.code,
            retryable: rule.retryable,
        })
        .unwrap_or(Classification {
            code: COLLECTION_ERROR,
            retryable: false,
        })
}
