//! Request orchestration: who pays for a rewrite, and bookkeeping after it.

use chrono::{DateTime, Utc};

use crate::{
    auth::Identity,
    data::{NewRequest, Profile, ProfileStore, StoreError},
    error::ApiError,
    llm::{GenerationError, Prompt, TextGenerator},
    prompt::{self, Length},
    quota,
    types::BuzzifyResp,
};

pub struct Deps<'a> {
    pub store: &'a dyn ProfileStore,
    pub generator: &'a dyn TextGenerator,

    /// Pays for quota-funded calls.
    pub pooled_api_key: &'a str,

    pub free_requests_per_day: u32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Funding {
    Quota,
    Caller,
}

/// Profile as it stands in the current window.
#[derive(Debug, Clone)]
pub struct Normalized {
    pub profile: Profile,
    pub effective_usage: u32,
}

pub fn validate_text(text: &str) -> Result<&str, ApiError> {
    let text = text.trim();
    if text.is_empty() {
        return Err(ApiError::InvalidInput("Text is required".to_string()));
    }
    Ok(text)
}

/// Loads the caller's profile, creating it on first sight, and resets a
/// stale window. A failed reset write is logged and otherwise ignored.
pub async fn load_profile(
    store: &dyn ProfileStore,
    identity: &Identity,
    now: DateTime<Utc>,
) -> Result<Normalized, ApiError> {
    let window_start = quota::current_window_start_at(now);
    let profile = match store.profile(&identity.uid).await {
        Ok(profile) => profile,
        Err(StoreError::NotFound { .. }) => {
            tracing::info!("Creating profile.");
            store
                .create_profile(
                    &identity.uid,
                    identity.email.as_deref(),
                    window_start,
                )
                .await?
        }
        Err(error) => return Err(error.into()),
    };
    let effective_usage = quota::effective_usage_at(&profile, now);
    if quota::is_window_stale_at(profile.free_requests_reset_at, now) {
        tracing::info!(
            prev_window = %profile.free_requests_reset_at,
            prev_used = profile.free_requests_used,
            "Resetting stale quota window."
        );
        if let Err(error) = store.reset_window(&identity.uid, window_start).await
        {
            tracing::error!(?error, "Failed to persist quota reset.");
        }
    }
    Ok(Normalized {
        profile,
        effective_usage,
    })
}

/// Picks the key that pays for this call, or fails when the free requests
/// are spent and the caller has no key of their own.
pub fn choose_credential<'a>(
    remaining: u32,
    pooled_api_key: &'a str,
    supplied: Option<&'a str>,
    saved: Option<&'a str>,
) -> Result<(&'a str, Funding), ApiError> {
    if remaining > 0 {
        return Ok((pooled_api_key, Funding::Quota));
    }
    let non_blank = |key: &&str| !key.trim().is_empty();
    supplied
        .filter(non_blank)
        .or(saved.filter(non_blank))
        .map(|key| (key.trim(), Funding::Caller))
        .ok_or(ApiError::QuotaExhausted)
}

#[tracing::instrument(name = "buzzify", skip_all, fields(uid = %identity.uid))]
pub async fn buzzify(
    deps: &Deps<'_>,
    identity: &Identity,
    text: &str,
    supplied_api_key: Option<&str>,
    length: Length,
    now: DateTime<Utc>,
) -> Result<BuzzifyResp, ApiError> {
    let Normalized {
        profile,
        effective_usage,
    } = load_profile(deps.store, identity, now).await?;
    let remaining = quota::remaining(effective_usage, deps.free_requests_per_day);
    let (api_key, funding) = choose_credential(
        remaining,
        deps.pooled_api_key,
        supplied_api_key,
        profile.api_key.as_deref(),
    )?;
    tracing::info!(effective_usage, remaining, ?funding, ?length, "Generating.");

    let user = prompt::user_instruction(text, length);
    let prompt = Prompt {
        system: prompt::SYSTEM_INSTRUCTION,
        user: &user,
    };
    let generated = deps.generator.generate(api_key, prompt).await;
    let used_free_request = funding == Funding::Quota && generated.is_ok();

    if used_free_request {
        let window_start = quota::current_window_start_at(now);
        if let Err(error) = deps
            .store
            .charge_free_request(
                &identity.uid,
                window_start,
                deps.free_requests_per_day,
            )
            .await
        {
            tracing::error!(?error, "Failed to record free request usage.");
        }
    }

    let entry = NewRequest {
        user_id: &identity.uid,
        input_text: text,
        output_text: generated.as_deref().ok(),
        used_free_request,
    };
    if let Err(error) = deps.store.log_request(&entry).await {
        tracing::error!(?error, "Failed to log request.");
    }

    let result = generated.map_err(|error| match (funding, error) {
        // The pooled key is ours to fix, not the caller's.
        (Funding::Quota, GenerationError::InvalidCredential) => {
            ApiError::Generation(GenerationError::InvalidCredential)
        }
        (_, error) => error.into(),
    })?;
    let free_requests_remaining = if used_free_request {
        remaining.saturating_sub(1)
    } else {
        remaining
    };
    Ok(BuzzifyResp {
        result,
        used_free_request,
        free_requests_remaining,
    })
}
