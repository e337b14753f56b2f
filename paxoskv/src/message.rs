use std::{error::Error, fmt, str::FromStr};

use serde::{Deserialize, Serialize};

/// Operation carried by a [`Request`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Method {
    /// Insert or overwrite a key. Goes through consensus.
    Put,
    /// Read a key from the local store.
    Get,
    /// Remove a key. Goes through consensus.
    Delete,
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Method::Put => "PUT",
            Method::Get => "GET",
            Method::Delete => "DELETE",
        })
    }
}

impl FromStr for Method {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "PUT" => Ok(Method::Put),
            "GET" => Ok(Method::Get),
            "DELETE" => Ok(Method::Delete),
            _ => Err(ParseError::UnknownMethod(s.trim().to_owned())),
        }
    }
}

/// A client operation. PUT always carries a value, GET and DELETE never do.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Request {
    method: Method,
    key: String,
    value: Option<String>,
}

impl Request {
    /// Build a request, checking that the value clause fits the method.
    pub fn new(method: Method, key: String, value: Option<String>) -> Result<Self, ParseError> {
        if key.is_empty() {
            return Err(ParseError::MissingKey);
        }
        match (method, value.is_some()) {
            (Method::Put, false) => Err(ParseError::MissingValue),
            (Method::Get, true) | (Method::Delete, true) => {
                Err(ParseError::UnexpectedValue(method))
            }
            _ => Ok(Self { method, key, value }),
        }
    }

    /// PUT `key` = `value`.
    pub fn put(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            method: Method::Put,
            key: key.into(),
            value: Some(value.into()),
        }
    }

    /// GET `key`.
    pub fn get(key: impl Into<String>) -> Self {
        Self {
            method: Method::Get,
            key: key.into(),
            value: None,
        }
    }

    /// DELETE `key`.
    pub fn delete(key: impl Into<String>) -> Self {
        Self {
            method: Method::Delete,
            key: key.into(),
            value: None,
        }
    }

    /// The operation.
    pub fn method(&self) -> Method {
        self.method
    }

    /// The key operated on.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// The value, present for PUT only.
    pub fn value(&self) -> Option<&str> {
        self.value.as_deref()
    }
}

/// Renders `method: M, key: K[, value: V]`.
impl fmt::Display for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "method: {}, key: {}", self.method, self.key)?;
        if let Some(value) = &self.value {
            write!(f, ", value: {}", value)?;
        }
        Ok(())
    }
}

impl FromStr for Request {
    type Err = ParseError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let mut method = None;
        let mut key = None;
        let mut value = None;
        for (name, content) in clauses(input)? {
            let slot = match name {
                "method" => {
                    if method.replace(content.parse::<Method>()?).is_some() {
                        return Err(ParseError::DuplicateField(name.to_owned()));
                    }
                    continue;
                }
                "key" => &mut key,
                "value" => &mut value,
                _ => return Err(ParseError::UnknownField(name.to_owned())),
            };
            if slot.replace(content.to_owned()).is_some() {
                return Err(ParseError::DuplicateField(name.to_owned()));
            }
        }
        let method = method.ok_or(ParseError::MissingMethod)?;
        let key = key.ok_or(ParseError::MissingKey)?;
        Request::new(method, key, value)
    }
}

/// Split `name: content, name: content[, name: content]` into trimmed pairs.
fn clauses(input: &str) -> Result<Vec<(&str, &str)>, ParseError> {
    let input = input.trim();
    if input.is_empty() {
        return Err(ParseError::Empty);
    }
    let parts: Vec<&str> = input.split(',').collect();
    if parts.len() != 2 && parts.len() != 3 {
        return Err(ParseError::ClauseCount(parts.len()));
    }
    parts
        .into_iter()
        .map(|part| {
            let pair: Vec<&str> = part.split(':').collect();
            if pair.len() != 2 {
                return Err(ParseError::MissingSeparator(part.trim().to_owned()));
            }
            Ok((pair[0].trim(), pair[1].trim()))
        })
        .collect()
}

/// Outcome of a client operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Status {
    /// The operation took effect.
    Succeeded,
    /// The operation did not take effect.
    Failed,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Status::Succeeded => "SUCCEEDED",
            Status::Failed => "FAILED",
        })
    }
}

impl FromStr for Status {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "SUCCEEDED" => Ok(Status::Succeeded),
            "FAILED" => Ok(Status::Failed),
            _ => Err(ParseError::UnknownStatus(s.to_owned())),
        }
    }
}

/// Reply to a client operation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response {
    code: String,
    status: Status,
    value: Option<String>,
}

impl Response {
    /// Code of a successful operation.
    pub const OK: &'static str = "200";
    /// Code of a GET or DELETE on an absent key.
    pub const NOT_FOUND: &'static str = "400";
    /// Code of a write that found no quorum within the retry budget.
    pub const TIMEOUT: &'static str = "500";

    /// `200`, optionally echoing a value.
    pub fn ok(value: Option<String>) -> Self {
        Self {
            code: Self::OK.to_owned(),
            status: Status::Succeeded,
            value,
        }
    }

    /// `400`.
    pub fn not_found() -> Self {
        Self {
            code: Self::NOT_FOUND.to_owned(),
            status: Status::Failed,
            value: None,
        }
    }

    /// `500`.
    pub fn timeout() -> Self {
        Self {
            code: Self::TIMEOUT.to_owned(),
            status: Status::Failed,
            value: None,
        }
    }

    /// Status code as sent on the wire.
    pub fn code(&self) -> &str {
        &self.code
    }

    /// Whether the operation took effect.
    pub fn status(&self) -> Status {
        self.status
    }

    /// Value read or written, if any.
    pub fn value(&self) -> Option<&str> {
        self.value.as_deref()
    }
}

/// Renders `code: C, operation: S[, value: V]`.
impl fmt::Display for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "code: {}, operation: {}", self.code, self.status)?;
        if let Some(value) = &self.value {
            write!(f, ", value: {}", value)?;
        }
        Ok(())
    }
}

impl FromStr for Response {
    type Err = ParseError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let parts = clauses(input)?;
        let mut code = None;
        let mut status = None;
        let mut value = None;
        for (name, content) in parts {
            match name {
                "code" => code = Some(content.to_owned()),
                "operation" => status = Some(content.parse()?),
                "value" => value = Some(content.to_owned()),
                _ => return Err(ParseError::UnknownField(name.to_owned())),
            }
        }
        Ok(Self {
            code: code.ok_or_else(|| ParseError::MissingField("code".to_owned()))?,
            status: status.ok_or_else(|| ParseError::MissingField("operation".to_owned()))?,
            value,
        })
    }
}

/// An acceptor's answer to `prepare(n)`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Promise {
    /// Identity of the promising node.
    pub acceptor_id: String,
    /// The number promised.
    pub proposal_num: u64,
    /// Number of the last value this acceptor accepted, 0 if none.
    pub prev_proposal_num: u64,
    /// The last value this acceptor accepted.
    pub prev_accepted_value: Option<Request>,
}

/// An acceptor's acknowledgement of `accept(n, v)`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Accept {
    /// Identity of the accepting node.
    pub acceptor_id: String,
    /// The number accepted.
    pub proposal_num: u64,
    /// The value accepted.
    pub value: Request,
}

/// Protocol-level refusal, as opposed to a transport failure.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Rejection {
    /// The proposal number is too old. Carries the acceptor's promise.
    Stale {
        /// Highest number the acceptor has promised or accepted.
        promised: u64,
    },
    /// The acceptor's fault policy refused the call.
    Injected,
    /// The learner already applied this proposal.
    AlreadyLearned {
        /// The duplicated proposal number.
        proposal_num: u64,
    },
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rejection::Stale { promised } => {
                write!(f, "proposal is not newer than promised {}", promised)
            }
            Rejection::Injected => write!(f, "acceptor is configured to fail"),
            Rejection::AlreadyLearned { proposal_num } => {
                write!(f, "proposal {} has been learned", proposal_num)
            }
        }
    }
}

impl Error for Rejection {}

/// Why a line of client input is not a valid request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ParseError {
    /// Nothing but whitespace.
    Empty,
    /// Neither two nor three comma separated clauses.
    ClauseCount(usize),
    /// A clause without exactly one `:`.
    MissingSeparator(String),
    /// A method other than PUT, GET or DELETE.
    UnknownMethod(String),
    /// A status other than SUCCEEDED or FAILED.
    UnknownStatus(String),
    /// A clause name that is not recognised.
    UnknownField(String),
    /// The same clause given twice.
    DuplicateField(String),
    /// A required clause is absent.
    MissingField(String),
    /// No `method` clause.
    MissingMethod,
    /// No `key` clause, or an empty key.
    MissingKey,
    /// PUT without a `value` clause.
    MissingValue,
    /// GET or DELETE with a `value` clause.
    UnexpectedValue(Method),
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseError::Empty => write!(f, "the input is empty"),
            ParseError::ClauseCount(n) => write!(f, "malformed request with {} parts", n),
            ParseError::MissingSeparator(clause) => {
                write!(f, "expected `name: content`, got `{}`", clause)
            }
            ParseError::UnknownMethod(m) => write!(f, "unknown method `{}`", m),
            ParseError::UnknownStatus(s) => write!(f, "unknown operation status `{}`", s),
            ParseError::UnknownField(name) => write!(f, "unknown field `{}`", name),
            ParseError::DuplicateField(name) => write!(f, "field `{}` given twice", name),
            ParseError::MissingField(name) => write!(f, "field `{}` is missing", name),
            ParseError::MissingMethod => write!(f, "the method is missing"),
            ParseError::MissingKey => write!(f, "the key is missing"),
            ParseError::MissingValue => write!(f, "PUT requires a value"),
            ParseError::UnexpectedValue(m) => write!(f, "{} does not take a value", m),
        }
    }
}

impl Error for ParseError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_roundtrip() {
        let req: Request = "method: PUT, key: A, value: 1".parse().unwrap();
        assert_eq!(req, Request::put("A", "1"));
        assert_eq!(req.to_string().parse::<Request>().unwrap(), req);

        let req: Request = "  method: DELETE ,key:Jesse ".parse().unwrap();
        assert_eq!(req, Request::delete("Jesse"));
        assert_eq!(req.to_string(), "method: DELETE, key: Jesse");
    }

    #[test]
    fn test_method_is_case_insensitive() {
        let req: Request = "method: get, key: A".parse().unwrap();
        assert_eq!(req.method(), Method::Get);
    }

    #[test]
    fn test_malformed_requests() {
        let cases = [
            ("method: PUT, key: A", ParseError::MissingValue),
            ("", ParseError::Empty),
            ("method: PUT", ParseError::ClauseCount(1)),
            ("method: PUT, key: A, value: 1, value: 2", ParseError::ClauseCount(4)),
            ("method PUT, key: A", ParseError::MissingSeparator("method PUT".into())),
            ("method: PUT, key: A, value: 1:2", ParseError::MissingSeparator("value: 1:2".into())),
            ("method: POST, key: A", ParseError::UnknownMethod("POST".into())),
            ("method: GET, key: A, value: 1", ParseError::UnexpectedValue(Method::Get)),
            ("method: DELETE, key: A, value: 1", ParseError::UnexpectedValue(Method::Delete)),
            ("method: GET, colour: A", ParseError::UnknownField("colour".into())),
            ("key: A, value: 1", ParseError::MissingMethod),
            ("method: GET, key: ", ParseError::MissingKey),
            ("method: GET, method: PUT", ParseError::DuplicateField("method".into())),
        ];
        for (input, expected) in cases.iter() {
            assert_eq!(&input.parse::<Request>().unwrap_err(), expected, "{}", input);
        }
    }

    #[test]
    fn test_response_render() {
        assert_eq!(
            Response::ok(Some("75".into())).to_string(),
            "code: 200, operation: SUCCEEDED, value: 75"
        );
        assert_eq!(Response::not_found().to_string(), "code: 400, operation: FAILED");
        assert_eq!(Response::timeout().to_string(), "code: 500, operation: FAILED");
    }

    #[test]
    fn test_response_parse() {
        let resp: Response = "code: 200, operation: SUCCEEDED, value: 75".parse().unwrap();
        assert_eq!(resp, Response::ok(Some("75".into())));
        let resp: Response = "code: 500, operation: FAILED".parse().unwrap();
        assert_eq!(resp, Response::timeout());
        assert!("code: 200, operation: MAYBE".parse::<Response>().is_err());
    }
}
