#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use http::{Method, StatusCode};
    use serde_json::{json, Value};

    use strada::error::FieldError;
    use strada::{handler_fn, App, Context, FnSchema, Route, RouteMethod, RouteSchema, Schema};
    use strada_config::ServerConfig;

    fn user_body_schema() -> Arc<dyn Schema> {
        Arc::new(FnSchema::new(|value: &Value| {
            let mut errors = Vec::new();
            match value.get("name").and_then(Value::as_str) {
                Some(name) if name.len() >= 3 => {}
                Some(_) => errors.push(FieldError::new("name", "must be at least 3 characters")),
                None => errors.push(FieldError::new("name", "is required")),
            }
            match value.get("email").and_then(Value::as_str) {
                Some(email) if email.contains('@') && email.contains('.') => {}
                Some(_) => errors.push(FieldError::new("email", "must be a valid email address")),
                None => errors.push(FieldError::new("email", "is required")),
            }
            if errors.is_empty() {
                Ok(value.clone())
            } else {
                Err(errors)
            }
        }))
    }

    fn create_user_app(schema: RouteSchema) -> App {
        let app = App::new(ServerConfig::default());
        let route = Route::new("/users").method(
            Method::POST,
            RouteMethod::new(handler_fn(|ctx, _params| {
                let body = ctx.request.body.clone();
                Box::pin(async move { Ok(Some(body)) })
            }))
            .with_tag("create-user")
            .with_schema(schema),
        );
        app.router().apply("users.routes", vec![route]).unwrap();
        app
    }

    #[tokio::test]
    async fn test_request_validation_failure_envelope() {
        let app = create_user_app(RouteSchema {
            body: Some(user_body_schema()),
            ..RouteSchema::default()
        });

        let mut ctx = Context::new(Method::POST, "/users");
        ctx.request.body = json!({"name": "ab", "email": "x"});
        app.handle(&mut ctx).await;

        assert_eq!(ctx.response.status, StatusCode::BAD_REQUEST);
        let body = ctx.response.body_json().unwrap();
        assert_eq!(body["type"], "VALIDATION_ERROR");
        assert_eq!(body["title"], "Request validation failed");
        assert_eq!(body["status"], 400);
        assert!(body["correlationId"].is_string());
        assert!(body["timestamp"].is_string());

        let details = &body["details"];
        assert_eq!(details["errorCount"], 2);
        assert_eq!(details["section"], "body");
        let fields = details["fields"].as_array().unwrap();
        assert_eq!(fields.len(), 2);
        assert_eq!(fields[0]["field"], "name");
        assert!(fields[0]["messages"][0].is_string());
        assert_eq!(fields[1]["field"], "email");
    }

    #[tokio::test]
    async fn test_valid_request_passes_validation() {
        let app = create_user_app(RouteSchema {
            body: Some(user_body_schema()),
            ..RouteSchema::default()
        });

        let mut ctx = Context::new(Method::POST, "/users");
        ctx.request.body = json!({"name": "alice", "email": "alice@example.com"});
        app.handle(&mut ctx).await;

        assert_eq!(ctx.response.status, StatusCode::OK);
        assert_eq!(
            ctx.response.body_json().unwrap(),
            json!({"name": "alice", "email": "alice@example.com"})
        );
    }

    #[tokio::test]
    async fn test_response_validation_failure_is_a_500() {
        let response_schema: Arc<dyn Schema> = Arc::new(FnSchema::new(|value: &Value| {
            if value.get("id").map(Value::is_string).unwrap_or(false) {
                Ok(value.clone())
            } else {
                Err(vec![FieldError::new("id", "must be a string")])
            }
        }));

        let app = App::new(ServerConfig::default());
        let route = Route::new("/broken").method(
            Method::GET,
            RouteMethod::new(handler_fn(|_ctx, _params| {
                // Violates the declared response shape.
                Box::pin(async { Ok(Some(json!({"id": 42}))) })
            }))
            .with_schema(RouteSchema {
                response: Some(response_schema),
                ..RouteSchema::default()
            }),
        );
        app.router().apply("broken.routes", vec![route]).unwrap();

        let mut ctx = Context::new(Method::GET, "/broken");
        app.handle(&mut ctx).await;

        assert_eq!(ctx.response.status, StatusCode::INTERNAL_SERVER_ERROR);
        let body = ctx.response.body_json().unwrap();
        assert_eq!(body["type"], "INTERNAL_SERVER_ERROR");
        assert_eq!(body["title"], "Response validation failed");
        assert!(body["details"]["validationError"].is_array());
        assert!(body["details"]["hint"].is_string());
    }

    #[tokio::test]
    async fn test_error_envelope_passes_response_schema_untouched() {
        let strict: Arc<dyn Schema> = Arc::new(FnSchema::new(|value: &Value| {
            if value.get("id").is_some() {
                Ok(value.clone())
            } else {
                Err(vec![FieldError::new("id", "is required")])
            }
        }));

        let app = App::new(ServerConfig::default());
        let route = Route::new("/fails").method(
            Method::GET,
            RouteMethod::new(handler_fn(|_ctx, _params| {
                Box::pin(async {
                    Err(strada::error::Error::Unauthorized("token expired".to_string()))
                })
            }))
            .with_schema(RouteSchema {
                response: Some(strict),
                ..RouteSchema::default()
            }),
        );
        app.router().apply("fails.routes", vec![route]).unwrap();

        let mut ctx = Context::new(Method::GET, "/fails");
        app.handle(&mut ctx).await;

        // The 401 envelope reaches the client even though it does not
        // match the route's response schema.
        assert_eq!(ctx.response.status, StatusCode::UNAUTHORIZED);
        assert_eq!(ctx.response.body_json().unwrap()["type"], "UNAUTHORIZED");
    }
}
