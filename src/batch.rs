use crate::error::TransportError;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::fmt;

/// One record returned by the data source.
pub type Row = Map<String, Value>;

/// Opaque continuation token of a server-side cursor.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Cursor(String);

impl Cursor {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The server hands out numeric ids, but older deployments quote them.
    fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Number(id) => Some(Self(id.to_string())),
            Value::String(id) if !id.is_empty() => Some(Self(id)),
            _ => None,
        }
    }
}

impl From<&str> for Cursor {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Display for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One page of a collection query.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Batch {
    pub rows: Vec<Row>,
    pub cursor: Option<Cursor>,
}

impl Batch {
    pub fn new(rows: Vec<Row>, cursor: Option<Cursor>) -> Self {
        Self { rows, cursor }
    }

    /// A page shorter than requested is the last one.
    pub fn is_terminal(&self, batch_size: usize) -> bool {
        self.rows.len() < batch_size
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

mod json {
    use super::*;

    #[derive(Debug, Deserialize)]
    pub struct Response {
        #[serde(default)]
        pub results: Vec<Row>,
        #[serde(default)]
        pub id: Option<Value>,
    }
}

impl TryFrom<Value> for Batch {
    type Error = TransportError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        ensure_acknowledged(&value)?;
        let response: json::Response = serde_json::from_value(value)?;
        Ok(Self {
            rows: response.results,
            cursor: response.id.and_then(Cursor::from_value),
        })
    }
}

/// Rejects responses in which the data source reports a failed command.
pub(crate) fn ensure_acknowledged(value: &Value) -> Result<(), TransportError> {
    if is_failure(value.get("ok")) {
        let msg = value
            .get("errmsg")
            .and_then(Value::as_str)
            .unwrap_or("request was not acknowledged");
        return Err(TransportError::Server(msg.to_string()));
    }
    Ok(())
}

// `ok` is reported as 0/1 by the REST interface and as a float by mongod itself
fn is_failure(ok: Option<&Value>) -> bool {
    match ok {
        Some(Value::Number(ok)) => ok.as_f64() == Some(0.0),
        Some(Value::Bool(ok)) => !ok,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn parse_find_response() {
        let batch = Batch::try_from(json!({
            "ok": 1,
            "results": [{"dt": "2012-08-21", "visits_all": 10}],
            "id": 4
        }))
        .unwrap();
        assert_eq!(batch.len(), 1);
        assert_eq!(batch.cursor, Some(Cursor::from("4")));
        assert_eq!(batch.rows[0]["visits_all"], json!(10));
    }

    #[test]
    fn missing_results_is_an_empty_page() {
        let batch = Batch::try_from(json!({"id": "abc"})).unwrap();
        assert!(batch.is_empty());
        assert!(batch.is_terminal(1));
        assert_eq!(batch.cursor, Some(Cursor::from("abc")));
    }

    #[test]
    fn unacknowledged_response_is_an_error() {
        let err = Batch::try_from(json!({"ok": 0, "errmsg": "couldn't get cursor"}))
            .expect_err("error expected");
        assert!(
            matches!(&err, TransportError::Server(msg) if msg == "couldn't get cursor"),
            "expected: 'Server', got: {err:?}"
        );
    }

    #[test]
    fn non_object_response_is_invalid_json() {
        let err = Batch::try_from(json!([1, 2, 3])).expect_err("error expected");
        assert!(matches!(err, TransportError::InvalidJson(_)));
    }

    #[test]
    fn terminal_only_when_short() {
        let rows = vec![Row::new(), Row::new()];
        let batch = Batch::new(rows, None);
        assert!(!batch.is_terminal(2));
        assert!(batch.is_terminal(3));
    }
}
