//! Form validation run before any request leaves the client.

use crate::{
    error::ValidationError,
    domain::LineItemKind,
    protocol::{
        BlockInput, ClientPatch, LineItemInput, LocationInput, OperatingHours, RecurringRequest,
        TechnicianInput,
    },
};

pub type ValidationResult<T> = Result<T, ValidationError>;

pub fn require(field: &'static str, label: &str, value: &str) -> ValidationResult<()> {
    if value.trim().is_empty() {
        return Err(ValidationError::required(field, label));
    }
    Ok(())
}

/// Reduce a phone number to its 10 national digits.
///
/// Formatting characters are dropped and a leading US country code `1` on an
/// 11-digit number is stripped. Anything that does not leave exactly ten
/// digits is rejected.
pub fn normalize_phone(raw: &str) -> ValidationResult<String> {
    let digits: String = raw.chars().filter(char::is_ascii_digit).collect();
    let digits = match digits.len() {
        11 if digits.starts_with('1') => digits[1..].to_string(),
        _ => digits,
    };
    if digits.len() != 10 {
        return Err(ValidationError::new(
            "phone",
            "Phone number must be 10 digits",
        ));
    }
    Ok(digits)
}

pub fn format_phone(digits: &str) -> String {
    if digits.len() != 10 || !digits.chars().all(|c| c.is_ascii_digit()) {
        return digits.to_string();
    }
    format!("({}) {}-{}", &digits[..3], &digits[3..6], &digits[6..])
}

/// `"Newport Beach"` becomes `"newport-beach"`.
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut pending_dash = false;
    for ch in name.chars() {
        if ch.is_ascii_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(ch.to_ascii_lowercase());
        } else if ch == '\'' {
            continue;
        } else {
            pending_dash = true;
        }
    }
    slug
}

pub fn validate_slug(slug: &str) -> ValidationResult<()> {
    let valid = !slug.is_empty()
        && !slug.starts_with('-')
        && !slug.ends_with('-')
        && !slug.contains("--")
        && slug
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-');
    if !valid {
        return Err(ValidationError::new(
            "slug",
            "Slug may only contain lowercase letters, digits and single dashes",
        ));
    }
    Ok(())
}

pub fn validate_email(email: &str) -> ValidationResult<()> {
    let invalid = || ValidationError::new("email", "Enter a valid email address");
    let (local, domain) = email.trim().split_once('@').ok_or_else(invalid)?;
    if local.is_empty()
        || domain.contains('@')
        || !domain.contains('.')
        || domain.starts_with('.')
        || domain.ends_with('.')
        || email.chars().any(char::is_whitespace)
    {
        return Err(invalid());
    }
    Ok(())
}

pub fn validate_hex_color(color: &str) -> ValidationResult<()> {
    let valid = color.len() == 7
        && color.starts_with('#')
        && color[1..].chars().all(|c| c.is_ascii_hexdigit());
    if !valid {
        return Err(ValidationError::new(
            "color",
            "Color must be a hex value like #1f8a70",
        ));
    }
    Ok(())
}

pub fn validate_hours(hours: &OperatingHours) -> ValidationResult<()> {
    for (day, day_hours) in &hours.0 {
        if day_hours.is_open && day_hours.open >= day_hours.close {
            return Err(ValidationError::new(
                "hours",
                format!("{day:?} closing time must be after opening time"),
            ));
        }
    }
    Ok(())
}

impl LocationInput {
    /// Validate and normalise in place: trims text, fills a missing slug from
    /// the name and reduces the phone to 10 digits.
    pub fn validate(&mut self) -> ValidationResult<()> {
        self.name = self.name.trim().to_string();
        require("name", "Location name", &self.name)?;
        require("address", "Address", &self.address)?;
        require("city", "City", &self.city)?;
        require("state", "State", &self.state)?;
        require("zip", "ZIP code", &self.zip)?;
        require("phone", "Phone", &self.phone)?;

        self.slug = if self.slug.trim().is_empty() {
            slugify(&self.name)
        } else {
            self.slug.trim().to_string()
        };
        validate_slug(&self.slug)?;
        self.phone = normalize_phone(&self.phone)?;
        validate_hours(&self.hours)
    }
}

impl TechnicianInput {
    pub fn validate(&mut self) -> ValidationResult<()> {
        self.name = self.name.trim().to_string();
        require("name", "Technician name", &self.name)?;
        validate_hex_color(self.color.trim())?;
        self.color = self.color.trim().to_ascii_lowercase();
        if self.location_ids.is_empty() {
            return Err(ValidationError::new(
                "locationIds",
                "Assign the technician to at least one location",
            ));
        }
        self.location_ids.sort();
        self.location_ids.dedup();
        Ok(())
    }
}

impl ClientPatch {
    pub fn validate(&mut self) -> ValidationResult<()> {
        if let Some(name) = &self.name {
            require("name", "Client name", name)?;
            self.name = Some(name.trim().to_string());
        }
        if let Some(phone) = &self.phone {
            self.phone = Some(normalize_phone(phone)?);
        }
        if let Some(email) = &self.email {
            let email = email.trim().to_string();
            if !email.is_empty() {
                validate_email(&email)?;
            }
            self.email = Some(email);
        }
        if self.blocked == Some(true) {
            let reason = self
                .block_reason
                .as_deref()
                .map(str::trim)
                .unwrap_or_default();
            if reason.is_empty() {
                return Err(ValidationError::new(
                    "blockReason",
                    "A reason is required to block a client",
                ));
            }
            self.block_reason = Some(reason.to_string());
        }
        Ok(())
    }
}

impl LineItemInput {
    /// `current_total_cents` is the appointment total before this item.
    pub fn validate(&mut self, current_total_cents: i64) -> ValidationResult<()> {
        self.description = self.description.trim().to_string();
        require("description", "Description", &self.description)?;
        if self.quantity == 0 {
            return Err(ValidationError::new("quantity", "Quantity must be at least 1"));
        }
        if self.unit_price_cents < 0 {
            return Err(ValidationError::new("unitPrice", "Price cannot be negative"));
        }
        let Some(amount) = self.unit_price_cents.checked_mul(i64::from(self.quantity)) else {
            return Err(ValidationError::new("unitPrice", "Line total is too large"));
        };
        match self.kind {
            LineItemKind::Service if self.service_id.is_none() => Err(ValidationError::required(
                "serviceId",
                "Service",
            )),
            LineItemKind::Product if self.product_id.is_none() => Err(ValidationError::required(
                "productId",
                "Product",
            )),
            LineItemKind::Discount if amount > current_total_cents => {
                Err(ValidationError::new(
                    "unitPrice",
                    "Discount cannot exceed the appointment total",
                ))
            }
            _ => Ok(()),
        }
    }
}

impl BlockInput {
    pub fn validate(&mut self) -> ValidationResult<()> {
        self.title = self.title.trim().to_string();
        require("title", "Title", &self.title)?;
        if self.end_time <= self.start_time {
            return Err(ValidationError::new(
                "endTime",
                "End time must be after start time",
            ));
        }
        Ok(())
    }
}

impl RecurringRequest {
    /// A series needs exactly one end: an occurrence count or a last date,
    /// either on the request or inside the rule.
    pub fn validate(&self) -> ValidationResult<()> {
        let ends = [
            self.count.is_some(),
            self.until.is_some(),
            self.rule.count().is_some(),
            self.rule.until().is_some(),
        ]
        .into_iter()
        .filter(|set| *set)
        .count();
        match ends {
            0 => Err(ValidationError::new(
                "recurring",
                "Choose how many times the appointment repeats or when it ends",
            )),
            1 => match self.count {
                Some(0) => Err(ValidationError::new("count", "Count must be at least 1")),
                _ => Ok(()),
            },
            _ => Err(ValidationError::new(
                "recurring",
                "Set either a count or an end date, not both",
            )),
        }
    }
}

#[cfg(test)]
#[path = "tests/validation_tests.rs"]
mod tests;
