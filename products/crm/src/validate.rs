//! Field-level checks shared by every write path. Each helper records its
//! complaint in a [`FieldErrors`] and returns the cleaned value when valid.

use platform_api::FieldErrors;

use crate::money::Money;

pub const REQUIRED: &str = "This field is required.";
pub const BLANK: &str = "This field may not be blank.";
/// Width of every `phone` column.
pub const PHONE_MAX: usize = 20;

/// How an incoming payload maps onto a stored row.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WriteMode {
    Create,
    /// PUT: every writable field is replaced, absent nullable fields clear.
    Replace,
    /// PATCH: absent or `null` fields keep their stored value.
    Patch,
}

impl WriteMode {
    /// Whether a field should be written given whether the payload carried it.
    pub fn touches(self, present: bool) -> bool {
        present || self != WriteMode::Patch
    }
}

fn too_long(max: usize) -> String {
    format!("Ensure this field has no more than {max} characters.")
}

pub fn required_text(
    errors: &mut FieldErrors,
    field: &str,
    value: Option<&str>,
    max: usize,
) -> Option<String> {
    let Some(value) = value else {
        errors.add(field, REQUIRED);
        return None;
    };
    let trimmed = value.trim();
    if trimmed.is_empty() {
        errors.add(field, BLANK);
        return None;
    }
    if trimmed.chars().count() > max {
        errors.add(field, too_long(max));
        return None;
    }
    Some(trimmed.to_string())
}

/// Blank strings collapse to `None`.
pub fn optional_text(
    errors: &mut FieldErrors,
    field: &str,
    value: Option<String>,
    max: usize,
) -> Option<String> {
    let trimmed = value?.trim().to_string();
    if trimmed.is_empty() {
        return None;
    }
    if trimmed.chars().count() > max {
        errors.add(field, too_long(max));
        return None;
    }
    Some(trimmed)
}

pub fn phone(errors: &mut FieldErrors, value: Option<String>) -> Option<String> {
    optional_text(errors, "phone", value, PHONE_MAX)
}

pub fn required_email(errors: &mut FieldErrors, field: &str, value: Option<&str>) -> Option<String> {
    let email = required_text(errors, field, value, 254)?.to_lowercase();
    if !is_valid_email(&email) {
        errors.add(field, "Enter a valid email address.");
        return None;
    }
    Some(email)
}

pub fn is_valid_email(value: &str) -> bool {
    let Some((local, domain)) = value.rsplit_once('@') else {
        return false;
    };
    if local.is_empty() || local.len() > 64 || value.chars().any(char::is_whitespace) {
        return false;
    }
    let labels: Vec<&str> = domain.split('.').collect();
    labels.len() >= 2
        && labels.iter().all(|label| {
            !label.is_empty()
                && !label.starts_with('-')
                && !label.ends_with('-')
                && label.chars().all(|c| c.is_alphanumeric() || c == '-')
        })
}

pub fn username(errors: &mut FieldErrors, value: Option<&str>) -> Option<String> {
    let name = required_text(errors, "username", value, 150)?;
    if !name
        .chars()
        .all(|c| c.is_alphanumeric() || matches!(c, '@' | '.' | '+' | '-' | '_'))
    {
        errors.add(
            "username",
            "Enter a valid username. This value may contain only letters, numbers, and @/./+/-/_ characters.",
        );
        return None;
    }
    Some(name)
}

pub fn non_negative_count(errors: &mut FieldErrors, field: &str, value: Option<i64>) -> Option<i32> {
    let value = value?;
    if value < 0 {
        errors.add(field, "Ensure this value is greater than or equal to 0.");
        return None;
    }
    match i32::try_from(value) {
        Ok(value) => Some(value),
        Err(_) => {
            errors.add(field, "Ensure this value is less than or equal to 2147483647.");
            None
        }
    }
}

pub fn non_negative_float(errors: &mut FieldErrors, field: &str, value: Option<f64>) -> Option<f64> {
    let value = value?;
    if !value.is_finite() {
        errors.add(field, "A valid number is required.");
        return None;
    }
    if value < 0.0 {
        errors.add(field, "Ensure this value is greater than or equal to 0.");
        return None;
    }
    Some(value)
}

pub fn non_negative_money(errors: &mut FieldErrors, field: &str, value: Option<Money>) -> Option<Money> {
    let value = value?;
    if value.is_negative() {
        errors.add(field, "Ensure this value is greater than or equal to 0.");
        return None;
    }
    Some(value)
}

/// Case-insensitive match against a fixed set of choices.
pub fn choice<T: Copy>(
    errors: &mut FieldErrors,
    field: &str,
    value: &str,
    choices: &[(&str, T)],
) -> Option<T> {
    let wanted = value.trim();
    let found = choices
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case(wanted))
        .map(|(_, choice)| *choice);
    if found.is_none() {
        errors.add(field, format!("\"{wanted}\" is not a valid choice."));
    }
    found
}

pub fn http_url(errors: &mut FieldErrors, field: &str, value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.chars().count() > 2048 {
        errors.add(field, too_long(2048));
        return None;
    }
    match url::Url::parse(trimmed) {
        Ok(url) if matches!(url.scheme(), "http" | "https") && url.host().is_some() => {
            Some(trimmed.to_string())
        }
        _ => {
            errors.add(field, "Enter a valid URL.");
            None
        }
    }
}

pub fn is_hex_color(value: &str) -> bool {
    value
        .strip_prefix('#')
        .is_some_and(|hex| matches!(hex.len(), 3 | 6) && hex.chars().all(|c| c.is_ascii_hexdigit()))
}
