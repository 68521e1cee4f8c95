//! Envelope decoding and parameter validation.

use posecast_config::ModelsConfig;
use posecast_model::{CommandEnvelope, Resolution};
use serde_json::{Map, Value};

use super::error::{RpcError, ValidationError};
use crate::stream::StartRequest;

/// Keys accepted for the capture source, in lookup order.
const SOURCE_KEYS: [&str; 2] = ["camera", "source"];

/// The parts of an envelope that are still usable when the rest is invalid.
#[derive(Debug, Clone, Default)]
pub struct EnvelopeHeader {
    pub reply_to: Option<String>,
    pub context: Option<Value>,
}

impl EnvelopeHeader {
    pub fn read(object: &Map<String, Value>) -> Self {
        Self {
            reply_to: object
                .get("replyTo")
                .and_then(Value::as_str)
                .map(str::to_string),
            context: object.get("context").filter(|v| !v.is_null()).cloned(),
        }
    }
}

/// Parses raw bytes into a JSON object.
pub fn parse_object(raw: &[u8]) -> Result<Map<String, Value>, RpcError> {
    match serde_json::from_slice::<Value>(raw) {
        Ok(Value::Object(object)) => Ok(object),
        Ok(_) => Err(RpcError::Malformed("expected a JSON object".into())),
        Err(err) => Err(RpcError::Malformed(err.to_string())),
    }
}

/// Checks `method` and `params` and builds the typed envelope.
pub fn decode_command(
    object: Map<String, Value>,
) -> Result<CommandEnvelope, RpcError> {
    let header = EnvelopeHeader::read(&object);

    let method = match object.get("method") {
        None | Some(Value::Null) => {
            return Err(ValidationError::Missing(vec!["method".into()]).into());
        }
        Some(Value::String(method)) => method.clone(),
        Some(_) => {
            return Err(ValidationError::IncompatibleType("method".into()).into());
        }
    };

    let params = match object.get("params") {
        None | Some(Value::Null) => Map::new(),
        Some(Value::Object(params)) => params.clone(),
        Some(_) => {
            return Err(ValidationError::IncompatibleType("params".into()).into());
        }
    };

    Ok(CommandEnvelope {
        method,
        params,
        reply_to: header.reply_to,
        context: header.context,
    })
}

/// Validates `start` parameters.
///
/// Required: `camera` (or `source`), `model`, `resize_out_ratio`. `resize`
/// is optional; a missing or `0x0` value selects `models.default_resolution`.
pub fn parse_start(
    params: &Map<String, Value>,
    models: &ModelsConfig,
) -> Result<StartRequest, ValidationError> {
    let source_entry = SOURCE_KEYS
        .iter()
        .find_map(|key| params.get(*key).map(|value| (*key, value)));

    let mut missing = Vec::new();
    if source_entry.is_none() {
        missing.push(SOURCE_KEYS[0].to_string());
    }
    for key in ["model", "resize_out_ratio"] {
        if !params.contains_key(key) {
            missing.push(key.to_string());
        }
    }
    if !missing.is_empty() {
        return Err(ValidationError::Missing(missing));
    }

    let source = match source_entry {
        Some((_, Value::String(source))) if !source.trim().is_empty() => {
            source.trim().to_string()
        }
        Some((_, Value::Number(index))) if index.is_u64() => index.to_string(),
        Some((key, _)) => {
            return Err(ValidationError::IncompatibleType(format!(
                "params/{key}"
            )));
        }
        None => return Err(ValidationError::Missing(vec!["camera".into()])),
    };

    let model = match params.get("model") {
        Some(Value::String(model)) => model.clone(),
        _ => {
            return Err(ValidationError::IncompatibleType("params/model".into()));
        }
    };
    if !models.is_allowed(&model) {
        return Err(ValidationError::NotOneOf {
            path: "params/model".into(),
            allowed: models.allowed.clone(),
        });
    }

    let resolution = match params.get("resize") {
        None | Some(Value::Null) => Resolution::new(0, 0),
        Some(Value::String(raw)) => raw.parse::<Resolution>().map_err(|_| {
            ValidationError::InvalidFormat {
                path: "params/resize".into(),
                expected: "WIDTHxHEIGHT",
            }
        })?,
        Some(_) => {
            return Err(ValidationError::IncompatibleType("params/resize".into()));
        }
    }
    .or(models.default_resolution);

    let upsample = match params.get("resize_out_ratio").and_then(Value::as_f64) {
        Some(ratio) if ratio.is_finite() && ratio > 0.0 => ratio as f32,
        Some(_) => {
            return Err(ValidationError::InvalidFormat {
                path: "params/resize_out_ratio".into(),
                expected: "a positive number",
            });
        }
        None => {
            return Err(ValidationError::IncompatibleType(
                "params/resize_out_ratio".into(),
            ));
        }
    };

    Ok(StartRequest {
        source,
        model,
        resolution,
        upsample,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn models() -> ModelsConfig {
        ModelsConfig {
            dir: "./models".into(),
            allowed: vec!["cmu".into(), "mobilenet_thin".into()],
            default_resolution: Resolution::DEFAULT,
        }
    }

    fn params(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn full_start_params_parse() {
        let request = parse_start(
            &params(json!({
                "camera": "test.mp4",
                "model": "mobilenet_thin",
                "resize": "656x368",
                "resize_out_ratio": 4.0
            })),
            &models(),
        )
        .unwrap();
        assert_eq!(request.source, "test.mp4");
        assert_eq!(request.model, "mobilenet_thin");
        assert_eq!(request.resolution, Resolution::new(656, 368));
        assert_eq!(request.upsample, 4.0);
    }

    #[test]
    fn numeric_camera_and_default_resolution() {
        let request = parse_start(
            &params(json!({"camera": 0, "model": "cmu", "resize_out_ratio": 2})),
            &models(),
        )
        .unwrap();
        assert_eq!(request.source, "0");
        assert_eq!(request.resolution, Resolution::DEFAULT);
    }

    #[test]
    fn zero_resize_falls_back_to_default() {
        let request = parse_start(
            &params(json!({
                "source": "clip.mp4",
                "model": "cmu",
                "resize": "0x0",
                "resize_out_ratio": 1.0
            })),
            &models(),
        )
        .unwrap();
        assert_eq!(request.source, "clip.mp4");
        assert_eq!(request.resolution, Resolution::DEFAULT);
    }

    #[test]
    fn every_missing_param_is_named() {
        let err = parse_start(&params(json!({"model": "cmu"})), &models())
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Missing required param(s): 'camera, resize_out_ratio'"
        );

        let err = parse_start(&Map::new(), &models()).unwrap_err();
        assert_eq!(
            err,
            ValidationError::Missing(vec![
                "camera".into(),
                "model".into(),
                "resize_out_ratio".into()
            ])
        );
    }

    #[test]
    fn wrong_types_name_the_path() {
        let err = parse_start(
            &params(json!({"camera": "a", "model": "cmu", "resize_out_ratio": "4"})),
            &models(),
        )
        .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Incompatible type for param: 'params/resize_out_ratio'"
        );

        let err = parse_start(
            &params(json!({"source": [1], "model": "cmu", "resize_out_ratio": 4})),
            &models(),
        )
        .unwrap_err();
        assert_eq!(
            err,
            ValidationError::IncompatibleType("params/source".into())
        );
    }

    #[test]
    fn model_outside_allow_list() {
        let err = parse_start(
            &params(json!({"camera": "a", "model": "yolo", "resize_out_ratio": 4})),
            &models(),
        )
        .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Expected param 'params/model' to be one of: cmu, mobilenet_thin"
        );
    }

    #[test]
    fn bad_resize_and_ratio_values() {
        let err = parse_start(
            &params(json!({
                "camera": "a", "model": "cmu",
                "resize": "large", "resize_out_ratio": 4
            })),
            &models(),
        )
        .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Invalid format for param 'params/resize': expected WIDTHxHEIGHT"
        );

        let err = parse_start(
            &params(json!({"camera": "a", "model": "cmu", "resize_out_ratio": 0})),
            &models(),
        )
        .unwrap_err();
        assert!(matches!(err, ValidationError::InvalidFormat { .. }));
    }

    #[test]
    fn envelope_requires_method() {
        let object = parse_object(br#"{"params": {}, "replyTo": "r1"}"#).unwrap();
        let err = decode_command(object).unwrap_err();
        assert_eq!(err.to_string(), "Missing required param(s): 'method'");
    }

    #[test]
    fn envelope_without_params_is_accepted() {
        let object = parse_object(br#"{"method": "stop"}"#).unwrap();
        let command = decode_command(object).unwrap();
        assert_eq!(command.method, "stop");
        assert!(command.params.is_empty());
        assert!(command.reply_to.is_none());
    }

    #[test]
    fn non_object_payloads_are_malformed() {
        assert!(matches!(parse_object(b"[1,2]"), Err(RpcError::Malformed(_))));
        assert!(matches!(parse_object(b"{oops"), Err(RpcError::Malformed(_))));
    }
}
