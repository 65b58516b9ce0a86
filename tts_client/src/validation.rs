use crate::config::TtsOptions;
use crate::error::TtsError;

/// Maximum text length for a single chunked request
const MAX_TEXT_LENGTH: usize = 5000;
/// Maximum voice name length
const MAX_VOICE_LENGTH: usize = 64;

/// Validate client options
pub fn validate_options(opts: &TtsOptions) -> Result<(), TtsError> {
    validate_voice(&opts.voice)?;

    if !is_valid_language_code(&opts.language) {
        return Err(TtsError::InvalidInput(format!(
            "Invalid language code format: {}. Expected format: ll or ll_CC (e.g., en, en_US)",
            opts.language
        )));
    }

    if !(opts.base_url.starts_with("http://") || opts.base_url.starts_with("https://")) {
        return Err(TtsError::InvalidInput(format!(
            "Base URL must start with http:// or https://, got {}",
            opts.base_url
        )));
    }

    Ok(())
}

pub fn validate_voice(voice: &str) -> Result<(), TtsError> {
    if voice.trim().is_empty() {
        return Err(TtsError::InvalidInput("Voice cannot be empty".to_string()));
    }
    if voice.len() > MAX_VOICE_LENGTH {
        return Err(TtsError::InvalidInput(format!(
            "Voice name too long (max {} characters)",
            MAX_VOICE_LENGTH
        )));
    }
    Ok(())
}

/// Validate text for a chunked synthesis request
pub fn validate_text(text: &str) -> Result<(), TtsError> {
    if text.trim().is_empty() {
        return Err(TtsError::InvalidInput("Text cannot be empty".to_string()));
    }
    if text.chars().count() > MAX_TEXT_LENGTH {
        return Err(TtsError::InvalidInput(format!(
            "Text too long (max {} characters)",
            MAX_TEXT_LENGTH
        )));
    }
    Ok(())
}

/// Validate language code format (e.g., en, en_US)
pub(crate) fn is_valid_language_code(code: &str) -> bool {
    // ll (2 lowercase letters) or ll_CC (plus underscore and 2 uppercase letters)
    let parts: Vec<&str> = code.split('_').collect();
    match parts.len() {
        1 => parts[0].len() == 2 && parts[0].chars().all(|c| c.is_ascii_lowercase()),
        2 => {
            parts[0].len() == 2
                && parts[0].chars().all(|c| c.is_ascii_lowercase())
                && parts[1].len() == 2
                && parts[1].chars().all(|c| c.is_ascii_uppercase())
        }
        _ => false,
    }
}
