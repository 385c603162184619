//! Text generation messages
//!
//! The same structs travel both ways: protobuf on the gRPC side (prost) and
//! camelCase JSON on the gateway side (serde).

use serde::{Deserialize, Serialize};

#[derive(Clone, PartialEq, ::prost::Message, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GenerateRequest {
    #[prost(string, tag = "1")]
    pub input: String,
    #[prost(message, optional, tag = "2")]
    pub parameters: Option<GenerationParameters>,
}

#[derive(Clone, PartialEq, ::prost::Message, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GenerationParameters {
    /// Number of candidates to sample
    #[prost(int64, tag = "1")]
    #[serde(with = "int64_json")]
    pub top_k: i64,
    /// Nucleus sampling threshold
    #[prost(float, tag = "2")]
    pub top_p: f32,
    #[prost(float, tag = "3")]
    pub temperature: f32,
    #[prost(bool, tag = "4")]
    pub do_sample: bool,
}

#[derive(Clone, PartialEq, ::prost::Message, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GenerateResponse {
    #[prost(string, repeated, tag = "1")]
    pub texts: Vec<String>,
    #[prost(float, repeated, tag = "2")]
    pub scores: Vec<f32>,
}

/// JSON form of int64 fields: written as a string, read from a string or a
/// number
mod int64_json {
    use serde::de::Error;
    use serde::{Deserialize, Deserializer, Serializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Int64 {
        Number(i64),
        Text(String),
    }

    pub fn serialize<S: Serializer>(value: &i64, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(value)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i64, D::Error> {
        match Int64::deserialize(deserializer)? {
            Int64::Number(n) => Ok(n),
            Int64::Text(s) => s
                .trim()
                .parse()
                .map_err(|_| D::Error::custom(format!("invalid int64 value: {:?}", s))),
        }
    }
}
