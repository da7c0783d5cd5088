use utoipa::openapi::security::{ApiKey, ApiKeyValue, HttpAuthScheme};
use utoipa::OpenApi;

use crate::error::ErrorResponse;
use crate::prompt::Length;
use crate::types::{BuzzifyReq, BuzzifyResp, ProfileView, SaveApiKeyReq};

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::server::handle_buzzify,
        crate::server::handle_profile,
        crate::server::handle_save_api_key,
    ),
    components(
        schemas(
            BuzzifyReq,
            BuzzifyResp,
            Length,
            ProfileView,
            SaveApiKeyReq,
            ErrorResponse
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "buzzify", description = "Buzzify API endpoints")
    ),
    info(
        title = "Buzzify API",
        version = "1.0",
        description = "Rewrite plain text as business jargon. \
            A few free requests per day, then bring your own API key.",
        license(
            name = "BSD-3-Clause"
        )
    )
)]
pub struct ApiDoc;

struct SecurityAddon;

impl utoipa::Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "jwt",
                utoipa::openapi::security::SecurityScheme::Http(
                    utoipa::openapi::security::HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
            // Name is the default; the served cookie name is configurable.
            components.add_security_scheme(
                "session_cookie",
                utoipa::openapi::security::SecurityScheme::ApiKey(
                    ApiKey::Cookie(ApiKeyValue::new("sb-access-token")),
                ),
            );
        }
    }
}
