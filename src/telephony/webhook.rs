//! Call-setup webhook: answers the provider with markup that opens a
//! bidirectional media stream back to this service.

use crate::state::AppState;
use crate::telephony::events::CALLER_PARAMETER;
use actix_web::{web, HttpRequest, HttpResponse};
use serde::Deserialize;
use tracing::info;

/// Form fields the provider posts when a call arrives. Everything else in
/// the form is ignored.
#[derive(Debug, Deserialize)]
pub struct IncomingCall {
    #[serde(rename = "CallSid", default)]
    pub call_sid: String,
    #[serde(rename = "From", default)]
    pub from: String,
}

fn xml_escape(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

/// Markup connecting the call to `wss://{host}/media-stream`, passing the
/// caller id along as a custom stream parameter.
pub fn stream_markup(host: &str, caller_id: &str) -> String {
    let parameter = if caller_id.trim().is_empty() {
        String::new()
    } else {
        format!(
            r#"<Parameter name="{}" value="{}"/>"#,
            CALLER_PARAMETER,
            xml_escape(caller_id.trim())
        )
    };

    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?><Response><Connect><Stream url="wss://{}/media-stream">{}</Stream></Connect></Response>"#,
        xml_escape(host),
        parameter
    )
}

/// `POST /incoming-call`
pub async fn incoming_call(
    req: HttpRequest,
    form: web::Form<IncomingCall>,
    state: web::Data<AppState>,
) -> HttpResponse {
    let host = if state.config.server.public_host.is_empty() {
        req.connection_info().host().to_string()
    } else {
        state.config.server.public_host.clone()
    };

    info!(call_sid = %form.call_sid, caller = %form.from, host = %host, "Incoming call");

    HttpResponse::Ok()
        .content_type("text/xml")
        .body(stream_markup(&host, &form.from))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use actix_web::{test as actix_test, App};

    #[test]
    fn test_markup_escapes_values() {
        let markup = stream_markup("bridge.example.com", "+1 <555> & co");
        assert!(markup.contains(r#"<Stream url="wss://bridge.example.com/media-stream">"#));
        assert!(markup.contains(r#"<Parameter name="From" value="+1 &lt;555&gt; &amp; co"/>"#));
    }

    #[test]
    fn test_markup_without_caller() {
        let markup = stream_markup("bridge.example.com", "");
        assert!(!markup.contains("<Parameter"));
    }

    #[actix_web::test]
    async fn test_webhook_uses_host_header() {
        let state = AppState::build(AppConfig::default()).unwrap();
        let app = actix_test::init_service(
            App::new()
                .app_data(web::Data::new(state))
                .route("/incoming-call", web::post().to(incoming_call)),
        )
        .await;

        let req = actix_test::TestRequest::post()
            .uri("/incoming-call")
            .insert_header(("host", "abc123.ngrok.app"))
            .set_form([("CallSid", "CA1"), ("From", "+15550000"), ("CallStatus", "ringing")])
            .to_request();
        let resp = actix_test::call_service(&app, req).await;
        assert!(resp.status().is_success());
        assert_eq!(
            resp.headers().get("content-type").and_then(|v| v.to_str().ok()),
            Some("text/xml")
        );

        let body = actix_test::read_body(resp).await;
        let body = std::str::from_utf8(&body).unwrap();
        assert!(body.contains(r#"url="wss://abc123.ngrok.app/media-stream""#));
        assert!(body.contains(r#"value="+15550000""#));
    }

    #[actix_web::test]
    async fn test_webhook_prefers_public_host() {
        let mut config = AppConfig::default();
        config.server.public_host = "calls.example.org".to_string();
        let app = actix_test::init_service(
            App::new()
                .app_data(web::Data::new(AppState::build(config).unwrap()))
                .route("/incoming-call", web::post().to(incoming_call)),
        )
        .await;

        let req = actix_test::TestRequest::post()
            .uri("/incoming-call")
            .insert_header(("host", "internal:3002"))
            .set_form([("From", "+15550000")])
            .to_request();
        let body = actix_test::call_and_read_body(&app, req).await;
        assert!(std::str::from_utf8(&body).unwrap().contains("wss://calls.example.org/media-stream"));
    }
}
