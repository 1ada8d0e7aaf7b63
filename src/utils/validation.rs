use chrono::{DateTime, SecondsFormat, Utc};
use lazy_static::lazy_static;
use regex::Regex;
use serde_json::{Number, Value};
use std::borrow::Cow;
use validator::{Validate, ValidationError, ValidationErrors};

use crate::models::employee::{FieldSet, GateOutcome, ValidationErrorSet};

lazy_static! {
    // `\w` is Unicode-aware in `regex`; the local part and labels are ASCII only.
    static ref EMAIL_REGEX: Regex =
        Regex::new(r"^[A-Za-z0-9_-]+(\.[A-Za-z0-9_-]+)*@([A-Za-z0-9_-]+\.)+[a-zA-Z]{2,7}$").unwrap();
}

/// (struct field, response key) in the order errors are reported.
const RULE_ORDER: [(&str, &str); 7] = [
    ("name", "name"),
    ("email", "email"),
    ("mobile_no", "mobileNo"),
    ("designation", "designation"),
    ("gender", "gender"),
    ("courses", "courses"),
    ("image_filename", "image"),
];

#[derive(Debug, Validate)]
struct EmployeeSubmission {
    #[validate(length(min = 2, message = "The name must be at least 2 characters"))]
    name: String,
    #[validate(regex(path = "EMAIL_REGEX", message = "A valid email is required"))]
    email: String,
    #[validate(length(min = 10, message = "Mobile number must be at least 10 digits"))]
    mobile_no: Option<String>,
    #[validate(length(min = 2, message = "Designation must be at least 2 characters"))]
    designation: String,
    #[validate(custom = "validate_gender")]
    gender: String,
    #[validate(length(min = 1, message = "At least one course must be selected"))]
    courses: Vec<String>,
    #[validate(length(min = 1, message = "Image is required"))]
    image_filename: String,
}

impl EmployeeSubmission {
    // Absent keys read as empty values so they fail their rule like any short value.
    fn from_fields(fields: &FieldSet) -> Self {
        let text = |name: &str| fields.text(name).unwrap_or_default().to_string();

        Self {
            name: text("name"),
            email: text("email"),
            mobile_no: fields
                .text("mobileNo")
                .filter(|value| !value.is_empty())
                .map(str::to_string),
            designation: text("designation"),
            gender: text("gender"),
            courses: selected_courses(fields),
            image_filename: text("imageFilename"),
        }
    }
}

fn validate_gender(gender: &str) -> Result<(), ValidationError> {
    if gender != "Male" && gender != "Female" {
        let mut err = ValidationError::new("gender");
        err.message = Some(Cow::from("Gender must be 'Male' or 'Female'"));
        return Err(err);
    }
    Ok(())
}

fn selected_courses(fields: &FieldSet) -> Vec<String> {
    fields
        .list("courses")
        .into_iter()
        .filter(|course| !course.is_empty())
        .map(str::to_string)
        .collect()
}

fn collect_errors(errors: &ValidationErrors) -> ValidationErrorSet {
    let by_field = errors.field_errors();
    let mut set = ValidationErrorSet::new();

    for (field, key) in RULE_ORDER {
        let message = by_field
            .get(field)
            .and_then(|errs| errs.first())
            .and_then(|err| err.message.as_ref());

        if let Some(message) = message {
            set.push(key, message.to_string());
        }
    }

    set
}

/// Numeric coercion for `price`. Values that are not finite numbers become `null`.
fn coerce_number(raw: &str) -> Value {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Value::from(0);
    }

    match trimmed.parse::<f64>() {
        Ok(value) if value.is_finite() => {
            if value.fract() == 0.0 && value.abs() < 9_007_199_254_740_992.0 {
                Value::from(value as i64)
            } else {
                Number::from_f64(value).map(Value::Number).unwrap_or(Value::Null)
            }
        }
        _ => Value::Null,
    }
}

/// Checks one create-employee submission and, when every rule passes, returns the
/// record to persist with `createdAt` stamped and `price` coerced to a number.
pub fn validate_employee(fields: &FieldSet, now: DateTime<Utc>) -> GateOutcome {
    let submission = EmployeeSubmission::from_fields(fields);

    if let Err(errors) = submission.validate() {
        return GateOutcome::Rejected(collect_errors(&errors));
    }

    let mut record = fields.to_record();
    record.insert(
        "createdAt".to_string(),
        Value::String(now.to_rfc3339_opts(SecondsFormat::Millis, true)),
    );
    record.insert(
        "courses".to_string(),
        Value::Array(submission.courses.into_iter().map(Value::String).collect()),
    );
    if let Some(price) = fields.text("price").filter(|price| !price.is_empty()) {
        record.insert("price".to_string(), coerce_number(price));
    }

    GateOutcome::Accepted(record)
}
