//! Input Validation
//! Mission: Reject bad registration input before it touches the store

/// Username: 3-30 chars, alphanumeric plus `_` `.` `-`.
pub fn validate_username(username: &str) -> Result<(), String> {
    let len = username.chars().count();
    if !(3..=30).contains(&len) {
        return Err("Username must be between 3 and 30 characters".to_string());
    }
    if !username
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
    {
        return Err("Username may only contain letters, digits, '_', '.' and '-'".to_string());
    }
    Ok(())
}

/// Minimal structural email check: one `@`, non-empty local part, dotted
/// domain with no leading/trailing dot, no whitespace.
pub fn validate_email(email: &str) -> Result<(), String> {
    let err = || "Invalid email address".to_string();

    if email.chars().any(char::is_whitespace) {
        return Err(err());
    }
    let (local, domain) = email.split_once('@').ok_or_else(err)?;
    if local.is_empty() || domain.contains('@') {
        return Err(err());
    }
    if !domain.contains('.') || domain.starts_with('.') || domain.ends_with('.') {
        return Err(err());
    }
    Ok(())
}

/// Phone: optional leading `+`, then 10-15 digits.
pub fn validate_phone(phone: &str) -> Result<(), String> {
    let digits = phone.strip_prefix('+').unwrap_or(phone);
    let len = digits.chars().count();
    if !(10..=15).contains(&len) || !digits.chars().all(|c| c.is_ascii_digit()) {
        return Err("Phone number must be 10 to 15 digits".to_string());
    }
    Ok(())
}

/// Password policy: at least 8 characters with one uppercase, one lowercase,
/// and one digit. Special characters are welcome but not required.
pub fn validate_password(password: &str) -> Result<(), String> {
    if password.chars().count() < 8 {
        return Err("Password must be at least 8 characters".to_string());
    }
    if !password.chars().any(|c| c.is_ascii_uppercase()) {
        return Err("Password must contain an uppercase letter".to_string());
    }
    if !password.chars().any(|c| c.is_ascii_lowercase()) {
        return Err("Password must contain a lowercase letter".to_string());
    }
    if !password.chars().any(|c| c.is_ascii_digit()) {
        return Err("Password must contain a digit".to_string());
    }
    Ok(())
}

/// Case-fold an email for storage and lookup.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}
