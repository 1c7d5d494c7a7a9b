use reqwest::{
    blocking::multipart,
    header::{AUTHORIZATION, HeaderMap, HeaderValue},
};
use serde::{Deserialize, Serialize};
use tracing::info;

use labelsight_domain::{BbF, Detection, LsError, LsResult};

use crate::util::trace_ok_err;

/// Corners of a predicted box as sent by the detection service.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct PredictedBox {
    pub x1: f64,
    pub y1: f64,
    pub x2: f64,
    pub y2: f64,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Prediction {
    pub name: String,
    pub brand: String,
    #[serde(rename = "box")]
    pub bb: PredictedBox,
}

impl Prediction {
    pub fn label(&self) -> String {
        format!("Type: {}, Brand: {}", self.name, self.brand)
    }
    pub fn to_detection(&self) -> LsResult<Detection> {
        let PredictedBox { x1, y1, x2, y2 } = self.bb;
        Ok(Detection::new(
            BbF::from_tlbr(x1, y1, x2, y2)?,
            Some(self.label()),
        ))
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct PredictionsResponse {
    pub predictions: Vec<Prediction>,
}

impl PredictionsResponse {
    pub fn into_detections(self) -> LsResult<Vec<Detection>> {
        self.predictions
            .iter()
            .map(|p| {
                p.to_detection()
                    .map_err(|e| LsError::Prediction(format!("invalid box of {p:?}, {}", e.msg())))
            })
            .collect()
    }
}

/// Parses a response body of the detection service, e.g., one that was stored to a file.
pub fn parse_predictions(json_str: &str) -> LsResult<Vec<Detection>> {
    serde_json::from_str::<PredictionsResponse>(json_str)
        .map_err(|e| LsError::Prediction(format!("could not parse predictions, {e}")))?
        .into_detections()
}

pub trait Predict: Send + Sync {
    /// Detections for the encoded image `image_bytes`. `file_name` is passed on to the service.
    fn predict(&self, image_bytes: &[u8], file_name: &str) -> LsResult<Vec<Detection>>;
}

/// Client of a detection service that accepts images as multipart uploads.
pub struct RestPredictor {
    url: String,
    headers: HeaderMap,
    client: reqwest::blocking::Client,
}

impl RestPredictor {
    pub fn new(mut base_url: String, authorization: Option<&str>) -> Self {
        let client = reqwest::blocking::Client::new();
        let mut headers = HeaderMap::new();
        if let Some(s) = authorization {
            if let Some(s) = trace_ok_err(HeaderValue::from_str(s)) {
                headers.insert(AUTHORIZATION, s);
            }
        }
        while base_url.ends_with('/') {
            base_url.pop();
        }
        let url = if base_url.split('/').next_back() == Some("predict") {
            format!("{base_url}/")
        } else {
            format!("{base_url}/predict/")
        };
        Self {
            url,
            headers,
            client,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl Predict for RestPredictor {
    fn predict(&self, image_bytes: &[u8], file_name: &str) -> LsResult<Vec<Detection>> {
        let to_pred_err = |e: reqwest::Error| LsError::Prediction(e.to_string());
        let form = multipart::Form::new().part(
            "file",
            multipart::Part::bytes(image_bytes.to_vec()).file_name(file_name.to_string()),
        );
        info!("sending prediction request for {file_name} to {}", self.url());
        let response = self
            .client
            .post(&self.url)
            .headers(self.headers.clone())
            .multipart(form)
            .send()
            .map_err(to_pred_err)?;
        if response.status().is_success() {
            let detections = response
                .json::<PredictionsResponse>()
                .map_err(to_pred_err)?
                .into_detections()?;
            info!("received {} detections for {file_name}", detections.len());
            Ok(detections)
        } else {
            let status = response.status();
            let err_msg = response
                .text()
                .unwrap_or("no error message available".into());
            Err(LsError::Prediction(format!(
                "prediction failed with status {status} and error message '{err_msg}'"
            )))
        }
    }
}

/// Returns the same detections for every image.
#[derive(Debug, Clone, Default)]
pub struct FixedDetections(pub Vec<Detection>);

impl Predict for FixedDetections {
    fn predict(&self, _: &[u8], _: &str) -> LsResult<Vec<Detection>> {
        Ok(self.0.clone())
    }
}

#[cfg(test)]
const RESPONSE: &str = r#"{
    "predictions": [
        {"name": "cup", "brand": "acme", "box": {"x1": 10, "y1": 10, "x2": 50, "y2": 50}},
        {"name": "bottle", "brand": "", "box": {"x1": 12.5, "y1": 12, "x2": 52, "y2": 52}}
    ]
}"#;

#[test]
fn test_parse_predictions() {
    let dets = parse_predictions(RESPONSE).unwrap();
    assert_eq!(dets.len(), 2);
    assert_eq!(dets[0].label(), Some("Type: cup, Brand: acme"));
    assert_eq!(dets[0].bb, BbF::from_arr(&[10.0, 10.0, 40.0, 40.0]));
    assert_eq!(dets[1].label(), Some("Type: bottle, Brand: "));
    assert_eq!(dets[1].bb.x, 12.5);
    assert!(parse_predictions(r#"{"predictions": []}"#).unwrap().is_empty());
}

#[test]
fn test_parse_predictions_invalid() {
    let err = parse_predictions("{}").unwrap_err();
    assert!(matches!(err, LsError::Prediction(_)));
    let degenerate = r#"{"predictions": [
        {"name": "a", "brand": "b", "box": {"x1": 10, "y1": 10, "x2": 5, "y2": 50}}
    ]}"#;
    assert!(matches!(
        parse_predictions(degenerate),
        Err(LsError::Prediction(_))
    ));
}

#[test]
fn test_url() {
    let url = |s: &str| RestPredictor::new(s.into(), None).url().to_string();
    assert_eq!(url("http://localhost:8000"), "http://localhost:8000/predict/");
    assert_eq!(url("http://localhost:8000//"), "http://localhost:8000/predict/");
    assert_eq!(url("http://localhost:8000/predict"), "http://localhost:8000/predict/");
    let p = RestPredictor::new("http://a".into(), Some("Bearer xyz"));
    assert_eq!(p.headers.get(AUTHORIZATION).unwrap(), "Bearer xyz");
}

#[test]
fn test_unreachable_service() {
    // nothing listens on port 9 (discard) locally in the test environments
    let p = RestPredictor::new("http://127.0.0.1:9".into(), None);
    let err = p.predict(b"bytes", "a.png").unwrap_err();
    assert!(matches!(err, LsError::Prediction(_)));
}
