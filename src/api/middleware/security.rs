use axum::{body::Body, extract::Request, http::StatusCode, http::header, middleware::Next, response::Response};

pub async fn security_headers(req: Request, next: Next) -> Response {
    // Reject TRACE and TRACK methods
    let method = req.method();
    if method == "TRACE" || method == "TRACK" {
        let mut response = Response::new(Body::empty());
        *response.status_mut() = StatusCode::METHOD_NOT_ALLOWED;
        return response;
    }

    let mut response = next.run(req).await;
    let headers = response.headers_mut();

    headers.insert(
        header::X_CONTENT_TYPE_OPTIONS,
        header::HeaderValue::from_static("nosniff"),
    );

    headers.insert(
        header::REFERRER_POLICY,
        header::HeaderValue::from_static("strict-origin-when-cross-origin"),
    );

    headers.insert(
        header::HeaderName::from_static("x-permitted-cross-domain-policies"),
        header::HeaderValue::from_static("none"),
    );

    // Downloads are consumed by a browser frontend on another origin
    headers.insert(
        header::HeaderName::from_static("cross-origin-resource-policy"),
        header::HeaderValue::from_static("cross-origin"),
    );

    headers.insert(
        header::SERVER,
        header::HeaderValue::from_static("pdf-master"),
    );

    // Converted documents are one-off and never cacheable
    if !headers.contains_key(header::CACHE_CONTROL) {
        headers.insert(
            header::CACHE_CONTROL,
            header::HeaderValue::from_static("no-store"),
        );
    }

    response
}
