use chrono::{DateTime, FixedOffset, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::core::error::{AppError, AppResult};

/// Envelope for every successful response
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiResponse<T> {
    pub status_code: u16,
    pub data: T,
    pub message: String,
    pub success: bool,
}

impl<T> ApiResponse<T> {
    pub fn new(status_code: u16, data: T, message: &str) -> Self {
        Self {
            status_code,
            data,
            message: message.to_string(),
            success: status_code < 400,
        }
    }
}

/// Stand-in for the empty object returned by actions without a payload
#[derive(Debug, Serialize, Deserialize, Default)]
pub struct Empty {}

/// Login request
#[derive(Debug, Deserialize, Default)]
pub struct LoginRequest {
    pub email: Option<String>,
    pub password: Option<String>,
}

/// Request carrying only an email
#[derive(Debug, Deserialize, Default)]
pub struct EmailRequest {
    pub email: Option<String>,
}

/// One-time codes arrive either as text or as a bare number
#[derive(Debug, Deserialize, Clone)]
#[serde(untagged)]
pub enum OtpValue {
    Text(String),
    Number(u64),
}

impl OtpValue {
    pub fn into_string(self) -> String {
        match self {
            OtpValue::Text(text) => text,
            OtpValue::Number(number) => number.to_string(),
        }
    }
}

/// Reset code verification request
#[derive(Debug, Deserialize, Default)]
pub struct VerifyCodeRequest {
    pub email: Option<String>,
    pub otp: Option<OtpValue>,
}

/// New password after a verified code
#[derive(Debug, Deserialize, Default)]
pub struct ResetPasswordRequest {
    pub email: Option<String>,
    pub password: Option<String>,
}

/// Request naming a single worker
#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct WorkerIdRequest {
    pub worker_id: Option<String>,
}

/// Worker and the last day of the pay period
#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct PayPeriodRequest {
    pub worker_id: Option<String>,
    pub payment_to_date: Option<String>,
}

/// Date range for attendance history
#[derive(Debug, Deserialize, Default)]
pub struct DateRangeQuery {
    pub from: Option<String>,
    pub to: Option<String>,
}

/// Parse a client date, either `YYYY-MM-DD` or an RFC 3339 timestamp.
///
/// Timestamps are placed on the calendar of the work-day offset. A missing
/// value falls back to `default`.
pub fn parse_date(
    field: &str,
    raw: Option<&str>,
    offset: FixedOffset,
    default: NaiveDate,
) -> AppResult<NaiveDate> {
    let raw = match raw.map(str::trim).filter(|raw| !raw.is_empty()) {
        Some(raw) => raw,
        None => return Ok(default),
    };

    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Ok(date);
    }
    DateTime::parse_from_rfc3339(raw)
        .map(|at| at.with_timezone(&offset).date_naive())
        .map_err(|_| AppError::bad_request(format!("{} is not a valid date", field)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Offset, Utc};

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 15).unwrap()
    }

    #[test]
    fn test_parse_date_formats() {
        let utc = Utc.fix();
        assert_eq!(
            parse_date("paymentToDate", Some("2024-03-10"), utc, today()).unwrap(),
            NaiveDate::from_ymd_opt(2024, 3, 10).unwrap()
        );
        assert_eq!(
            parse_date("paymentToDate", None, utc, today()).unwrap(),
            today()
        );

        let ist = FixedOffset::east_opt(330 * 60).unwrap();
        assert_eq!(
            parse_date("paymentToDate", Some("2024-03-10T20:00:00.000Z"), ist, today()).unwrap(),
            NaiveDate::from_ymd_opt(2024, 3, 11).unwrap()
        );

        assert!(matches!(
            parse_date("paymentToDate", Some("tomorrow"), utc, today()),
            Err(AppError::BadRequest(msg)) if msg == "paymentToDate is not a valid date"
        ));
    }

    #[test]
    fn test_otp_accepts_text_or_number() {
        let text: VerifyCodeRequest =
            serde_json::from_str(r#"{"email":"a@b.co","otp":"012345"}"#).unwrap();
        assert_eq!(text.otp.unwrap().into_string(), "012345");

        let number: VerifyCodeRequest =
            serde_json::from_str(r#"{"email":"a@b.co","otp":482913}"#).unwrap();
        assert_eq!(number.otp.unwrap().into_string(), "482913");
    }

    #[test]
    fn test_envelope_shape() {
        let json = serde_json::to_value(ApiResponse::new(201, Empty {}, "done")).unwrap();
        assert_eq!(json["statusCode"], 201);
        assert_eq!(json["success"], true);
        assert_eq!(json["message"], "done");
        assert!(json["data"].as_object().unwrap().is_empty());
    }
}
