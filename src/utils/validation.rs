use crate::utils::error::{ConsentError, Result};
use std::collections::HashSet;
use url::Url;

/// Token replaced by the per-placeholder resource id in URL templates.
pub const DATA_ID_TOKEN: &str = "{data-id}";

pub trait Validate {
    fn validate(&self) -> Result<()>;
}

pub fn validate_url(field_name: &str, url_str: &str) -> Result<()> {
    if url_str.is_empty() {
        return Err(ConsentError::invalid_value(
            field_name,
            url_str,
            "URL cannot be empty",
        ));
    }

    match Url::parse(url_str) {
        Ok(url) => match url.scheme() {
            "http" | "https" => Ok(()),
            scheme => Err(ConsentError::invalid_value(
                field_name,
                url_str,
                format!("Unsupported URL scheme: {}", scheme),
            )),
        },
        Err(e) => Err(ConsentError::invalid_value(
            field_name,
            url_str,
            format!("Invalid URL format: {}", e),
        )),
    }
}

/// Validates a `{data-id}` template by checking the URL it expands to.
pub fn validate_url_template(field_name: &str, template: &str) -> Result<()> {
    let expanded = template.replace(DATA_ID_TOKEN, "sample-id");
    validate_url(field_name, &expanded).map_err(|_| {
        ConsentError::invalid_value(
            field_name,
            template,
            "Template must expand to an absolute http(s) URL",
        )
    })
}

pub fn validate_non_empty_string(field_name: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(ConsentError::invalid_value(
            field_name,
            value,
            "Value cannot be empty or whitespace-only",
        ));
    }
    Ok(())
}

pub fn validate_unique_names<'a, I>(field_name: &str, names: I) -> Result<()>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut seen = HashSet::new();
    for name in names {
        if !seen.insert(name) {
            return Err(ConsentError::invalid_value(
                field_name,
                name,
                "Duplicate name",
            ));
        }
    }
    Ok(())
}

pub fn validate_range<T: PartialOrd + std::fmt::Display + Copy>(
    field_name: &str,
    value: T,
    min: T,
    max: T,
) -> Result<()> {
    if value < min || value > max {
        return Err(ConsentError::invalid_value(
            field_name,
            value.to_string(),
            format!("Value must be between {} and {}", min, max),
        ));
    }
    Ok(())
}
