//! OpenAPI documentation of the relay proxy's own endpoints

use utoipa::OpenApi;

/// OpenAPI document served at `/vidu/openapi.json`
#[derive(OpenApi)]
#[openapi(
    info(
        title = "vidu-bridge relay proxy",
        version = "0.1.0",
        description = "Relays Vidu API requests with server-side credentials",
        license(
            name = "MIT OR Apache-2.0"
        )
    ),
    servers(
        (url = "http://localhost:6790", description = "Local relay proxy")
    ),
    paths(
        crate::proxy::routes::relay_standard,
        crate::proxy::routes::relay_pro,
        crate::proxy::routes::health_check,
        crate::proxy::routes::openapi_spec,
    ),
    components(schemas(
        crate::proxy::routes::HealthResponse,
        crate::proxy::routes::HealthConfig,
        crate::error::ApiError,
        crate::error::ErrorDetail,
    )),
    tags(
        (name = "relay", description = "Authenticated pass-through to the standard and pro upstreams"),
        (name = "system", description = "Health report and OpenAPI document"),
    ),
    modifiers(&SecurityAddon)
)]
pub struct ProxyDoc;

/// Adds the optional `x-ptoken` access-token scheme
struct SecurityAddon;

impl utoipa::Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = &mut openapi.components {
            components.add_security_scheme(
                "access_token",
                utoipa::openapi::security::SecurityScheme::ApiKey(
                    utoipa::openapi::security::ApiKey::Header(
                        utoipa::openapi::security::ApiKeyValue::new("x-ptoken"),
                    ),
                ),
            );
        }
    }
}
