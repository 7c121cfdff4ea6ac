use fleet_admin::http::response::{Response, ResponseBuilder, StatusCode};
use fleet_admin::http::writer::serialize_response;
use serde_json::json;

#[test]
fn test_status_code_as_u16() {
    assert_eq!(StatusCode::Ok.as_u16(), 200);
    assert_eq!(StatusCode::BadRequest.as_u16(), 400);
    assert_eq!(StatusCode::Forbidden.as_u16(), 403);
    assert_eq!(StatusCode::NotFound.as_u16(), 404);
    assert_eq!(StatusCode::MethodNotAllowed.as_u16(), 405);
    assert_eq!(StatusCode::InternalServerError.as_u16(), 500);
    assert_eq!(StatusCode::Other(418).as_u16(), 418);
}

#[test]
fn test_status_code_from_u16() {
    assert_eq!(StatusCode::from_u16(403), StatusCode::Forbidden);
    assert_eq!(StatusCode::from_u16(502), StatusCode::BadGateway);
    assert_eq!(StatusCode::from_u16(409), StatusCode::Other(409));
}

#[test]
fn test_status_code_reason_phrase() {
    assert_eq!(StatusCode::Ok.reason_phrase(), "OK");
    assert_eq!(StatusCode::Forbidden.reason_phrase(), "Forbidden");
    assert_eq!(
        StatusCode::MethodNotAllowed.reason_phrase(),
        "Method Not Allowed"
    );
    assert_eq!(
        StatusCode::InternalServerError.reason_phrase(),
        "Internal Server Error"
    );
}

#[test]
fn test_response_builder_with_headers() {
    let response = ResponseBuilder::new(StatusCode::Ok)
        .header("Content-Type", "text/css")
        .header("X-Custom", "value")
        .body(b"test".to_vec())
        .build();

    assert_eq!(response.content_type(), Some("text/css"));
    assert_eq!(response.headers.get("X-Custom").unwrap(), "value");
}

#[test]
fn test_response_builder_sets_content_length_and_default_type() {
    let body = b"This is the body".to_vec();
    let response = ResponseBuilder::new(StatusCode::Ok)
        .header("Content-Length", "999")
        .body(body.clone())
        .build();

    assert_eq!(response.headers.get("Content-Length").unwrap(), &body.len().to_string());
    assert_eq!(response.content_type(), Some("text/plain"));
}

#[test]
fn test_status_json_body() {
    let response = Response::status_json(StatusCode::Forbidden, "session already started");

    assert_eq!(response.status, StatusCode::Forbidden);
    assert_eq!(response.content_type(), Some("application/json"));
    assert_eq!(response.json_body().unwrap(), json!({"status": "session already started"}));
}

#[test]
fn test_internal_error_has_empty_body() {
    let response = Response::internal_error();

    assert_eq!(response.status, StatusCode::InternalServerError);
    assert!(response.body.is_empty());
    assert_eq!(response.headers.get("Content-Length").unwrap(), "0");
}

#[test]
fn test_serialize_response_wire_format() {
    let response = Response::ok("hi");
    let wire = String::from_utf8(serialize_response(&response)).unwrap();

    assert!(wire.starts_with("HTTP/1.1 200 OK\r\n"));
    assert!(wire.contains("Content-Length: 2\r\n"));
    assert!(wire.ends_with("\r\n\r\nhi"));
}
