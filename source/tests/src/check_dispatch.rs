#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use http::{header, HeaderValue, Method, StatusCode};
    use serde_json::json;
    use tracing::Span;

    use strada::error::Error;
    use strada::pipeline::Next;
    use strada::{
        current_correlation_id, handler_fn, App, Context, Middleware, Route, RouteMethod,
    };
    use strada_config::ServerConfig;

    fn echo_id_route() -> Route {
        Route::new("/users/:id").method(
            Method::GET,
            RouteMethod::new(handler_fn(|_ctx, params| {
                Box::pin(async move {
                    Ok(Some(json!({"id": params.get("id").cloned().unwrap_or_default()})))
                })
            }))
            .with_tag("get-user"),
        )
    }

    #[tokio::test]
    async fn test_unknown_route_returns_404() {
        let app = App::new(ServerConfig::default());
        let mut ctx = Context::new(Method::GET, "/missing");
        app.handle(&mut ctx).await;

        assert_eq!(ctx.response.status, StatusCode::NOT_FOUND);
        assert_eq!(
            ctx.response.body_json().unwrap(),
            json!({"error": "Not Found"})
        );
    }

    #[tokio::test]
    async fn test_method_not_allowed_lists_the_allowed_set() {
        let app = App::new(ServerConfig::default());
        let noop = || {
            RouteMethod::new(handler_fn(|_ctx, _params| {
                Box::pin(async { Ok(Some(json!({}))) })
            }))
        };
        let route = Route::new("/users")
            .method(Method::POST, noop())
            .method(Method::GET, noop());
        app.router().apply("users.routes", vec![route]).unwrap();

        let mut ctx = Context::new(Method::DELETE, "/users");
        app.handle(&mut ctx).await;

        assert_eq!(ctx.response.status, StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(
            ctx.response.body_json().unwrap(),
            json!({"error": "Method Not Allowed", "allowed": ["GET", "POST"]})
        );
        assert_eq!(
            ctx.response.headers.get(header::ALLOW).unwrap(),
            "GET, POST"
        );
    }

    #[tokio::test]
    async fn test_valid_request_reaches_the_handler_with_params() {
        let app = App::new(ServerConfig::default());
        app.router()
            .apply("users.routes", vec![echo_id_route()])
            .unwrap();

        let mut ctx = Context::new(Method::GET, "/users/42");
        app.handle(&mut ctx).await;

        assert_eq!(ctx.response.status, StatusCode::OK);
        assert_eq!(ctx.response.body_json().unwrap(), json!({"id": "42"}));
        assert_eq!(
            ctx.request.params.get("id").map(String::as_str),
            Some("42")
        );
    }

    #[tokio::test]
    async fn test_correlation_ids_stay_isolated_across_concurrent_requests() {
        let app = Arc::new(App::new(ServerConfig::default()));
        let route = Route::new("/whoami").method(
            Method::GET,
            RouteMethod::new(handler_fn(|_ctx, _params| {
                Box::pin(async {
                    // Suspend a few times so other requests interleave.
                    for _ in 0..5 {
                        tokio::task::yield_now().await;
                    }
                    Ok(Some(json!({"correlationId": current_correlation_id()})))
                })
            })),
        );
        app.router().apply("whoami.routes", vec![route]).unwrap();

        let tasks: Vec<_> = (0..16)
            .map(|i| {
                let app = app.clone();
                tokio::spawn(async move {
                    let inbound = format!("req-isolated-{i}");
                    let mut ctx = Context::new(Method::GET, "/whoami");
                    ctx.request.headers.insert(
                        "x-correlation-id",
                        HeaderValue::from_str(&inbound).unwrap(),
                    );
                    app.handle(&mut ctx).await;
                    (inbound, ctx.response.body_json().unwrap())
                })
            })
            .collect();

        for task in tasks {
            let (inbound, body) = task.await.unwrap();
            assert_eq!(body["correlationId"], json!(inbound));
        }
    }

    #[tokio::test]
    async fn test_double_next_invocation_surfaces_as_500_envelope() {
        struct Greedy;

        #[async_trait]
        impl Middleware for Greedy {
            fn name(&self) -> &str {
                "greedy"
            }

            async fn execute(
                &self,
                ctx: &mut Context,
                next: Next,
                _span: Span,
            ) -> Result<(), Error> {
                next.run(ctx).await?;
                next.run(ctx).await
            }
        }

        let app = App::new(ServerConfig::default());
        let route = Route::new("/greedy").method(
            Method::GET,
            RouteMethod::new(handler_fn(|_ctx, _params| Box::pin(async { Ok(None) })))
                .with_middleware(vec![Arc::new(Greedy)]),
        );
        app.router().apply("greedy.routes", vec![route]).unwrap();

        let mut ctx = Context::new(Method::GET, "/greedy");
        app.handle(&mut ctx).await;

        assert_eq!(ctx.response.status, StatusCode::INTERNAL_SERVER_ERROR);
        let body = ctx.response.body_json().unwrap();
        assert_eq!(body["type"], "INTERNAL_SERVER_ERROR");
        assert!(body["correlationId"].is_string());
    }

    #[tokio::test]
    async fn test_domain_errors_keep_their_status() {
        let app = App::new(ServerConfig::default());
        let route = Route::new("/secret").method(
            Method::GET,
            RouteMethod::new(handler_fn(|_ctx, _params| {
                Box::pin(async { Err(Error::Forbidden("admin only".to_string())) })
            })),
        );
        app.router().apply("secret.routes", vec![route]).unwrap();

        let mut ctx = Context::new(Method::GET, "/secret");
        app.handle(&mut ctx).await;

        assert_eq!(ctx.response.status, StatusCode::FORBIDDEN);
        let body = ctx.response.body_json().unwrap();
        assert_eq!(body["type"], "FORBIDDEN");
        assert_eq!(body["title"], "admin only");
    }
}
