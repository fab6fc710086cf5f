//! crates/memoria_core/src/validation.rs
//!
//! Schema-style validation of the two submission forms.
//!
//! Forms are sanitized first and then checked field by field. Every invalid
//! field is reported at once, each with its first failing rule, so a form can
//! annotate all of its inputs in one pass.

use std::collections::BTreeMap;
use std::sync::OnceLock;

use regex::Regex;
use serde::Serialize;

use crate::domain::{ImageFile, NewSubmission, SubmissionContent, Submitter};
use crate::image_processing::{
    validate_image, ImageError, MAX_BANNER_IMAGE_SIZE, MAX_DNI_IMAGE_SIZE, MAX_PORTAL_IMAGE_SIZE,
};

pub const MIN_NAME_LENGTH: usize = 2;
pub const MAX_NAME_LENGTH: usize = 50;
pub const MIN_TITLE_LENGTH: usize = 5;
pub const MAX_TITLE_LENGTH: usize = 100;
pub const MIN_CONTENT_LENGTH: usize = 50;
pub const MAX_CONTENT_LENGTH: usize = 10_000;
pub const MIN_DESCRIPTION_LENGTH: usize = 10;
pub const MAX_DESCRIPTION_LENGTH: usize = 1_000;
pub const DEFAULT_PAGE_SIZE: usize = 12;
pub const MAX_PAGE_SIZE: usize = 100;

fn name_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[a-zA-ZáéíóúÁÉÍÓÚñÑ\s]+$").expect("valid name regex"))
}

fn phone_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[0-9]{10,15}$").expect("valid phone regex"))
}

fn url_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^https?://[^\s/?#]+([/?#]\S*)?$").expect("valid url regex"))
}

fn whitespace_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\s+").expect("valid whitespace regex"))
}

//=========================================================================================
// Sanitization
//=========================================================================================

/// Trims, strips angle brackets and collapses internal whitespace.
pub fn sanitize_string(input: &str) -> String {
    let stripped: String = input.trim().chars().filter(|c| *c != '<' && *c != '>').collect();
    whitespace_pattern().replace_all(&stripped, " ").into_owned()
}

/// Keeps only the digits of a phone number.
pub fn sanitize_phone(phone: &str) -> String {
    phone.chars().filter(|c| c.is_ascii_digit()).collect()
}

//=========================================================================================
// Field Errors
//=========================================================================================

/// Field name to Spanish error message.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, thiserror::Error)]
#[serde(transparent)]
#[error("invalid fields: {}", field_list(.0))]
pub struct FieldErrors(BTreeMap<String, String>);

impl FieldErrors {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `message` for `field` unless an earlier rule already failed there.
    pub fn add(&mut self, field: &str, message: impl Into<String>) {
        self.0.entry(field.to_string()).or_insert_with(|| message.into());
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        self.0.get(field).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn into_result<T>(self, value: T) -> Result<T, FieldErrors> {
        if self.is_empty() {
            Ok(value)
        } else {
            Err(self)
        }
    }
}

fn field_list(errors: &BTreeMap<String, String>) -> String {
    errors.keys().map(String::as_str).collect::<Vec<_>>().join(", ")
}

//=========================================================================================
// Forms
//=========================================================================================

/// Raw input of the narrative form.
#[derive(Debug, Clone, Default)]
pub struct RelatoForm {
    pub name: String,
    pub surname: String,
    pub phone: String,
    pub title: String,
    pub content: String,
    pub dni_image: Option<ImageFile>,
    pub banner_image: Option<ImageFile>,
}

/// Raw input of the memorial entry form.
#[derive(Debug, Clone, Default)]
pub struct PortalMemoriaForm {
    pub name: String,
    pub surname: String,
    pub phone: String,
    pub description: String,
    pub dni_image: Option<ImageFile>,
    pub image: Option<ImageFile>,
}

/// A sanitized narrative whose files passed validation.
#[derive(Debug, Clone)]
pub struct ValidRelato {
    pub submitter: Submitter,
    pub title: String,
    pub content: String,
    pub dni_image: ImageFile,
    pub banner_image: ImageFile,
}

/// A sanitized memorial entry whose files passed validation.
#[derive(Debug, Clone)]
pub struct ValidPortalMemoria {
    pub submitter: Submitter,
    pub description: String,
    pub dni_image: ImageFile,
    pub image: ImageFile,
}

/// Either validated form, ready for upload.
#[derive(Debug, Clone)]
pub enum ValidSubmission {
    Relato(ValidRelato),
    PortalMemoria(ValidPortalMemoria),
}

struct Length {
    min: usize,
    max: usize,
    too_short: &'static str,
    too_long: &'static str,
}

fn check_length(errors: &mut FieldErrors, field: &str, value: &str, rule: &Length) {
    let len = value.chars().count();
    if len < rule.min {
        errors.add(field, rule.too_short);
    } else if len > rule.max {
        errors.add(field, rule.too_long);
    }
}

fn check_submitter(errors: &mut FieldErrors, name: &str, surname: &str, phone: &str) -> Submitter {
    let name = sanitize_string(name);
    let surname = sanitize_string(surname);
    let phone = sanitize_phone(phone);

    check_length(
        errors,
        "name",
        &name,
        &Length {
            min: MIN_NAME_LENGTH,
            max: MAX_NAME_LENGTH,
            too_short: "El nombre debe tener al menos 2 caracteres.",
            too_long: "El nombre no puede tener más de 50 caracteres.",
        },
    );
    if !name_pattern().is_match(&name) {
        errors.add("name", "El nombre solo puede contener letras y espacios.");
    }

    check_length(
        errors,
        "surname",
        &surname,
        &Length {
            min: MIN_NAME_LENGTH,
            max: MAX_NAME_LENGTH,
            too_short: "El apellido debe tener al menos 2 caracteres.",
            too_long: "El apellido no puede tener más de 50 caracteres.",
        },
    );
    if !name_pattern().is_match(&surname) {
        errors.add("surname", "El apellido solo puede contener letras y espacios.");
    }

    if !phone_pattern().is_match(&phone) {
        errors.add(
            "phone",
            "Número de teléfono inválido. Debe tener entre 10 y 15 dígitos.",
        );
    }

    Submitter { name, surname, phone }
}

fn check_file(errors: &mut FieldErrors, field: &str, file: Option<&ImageFile>, max_bytes: usize) {
    let result = match file {
        None => Err(ImageError::Required),
        Some(file) => validate_image(file, max_bytes),
    };
    if let Err(err) = result {
        errors.add(field, err.user_message());
    }
}

/// Validates the narrative form.
pub fn validate_relato_submission(form: &RelatoForm) -> Result<ValidRelato, FieldErrors> {
    let mut errors = FieldErrors::new();
    let submitter = check_submitter(&mut errors, &form.name, &form.surname, &form.phone);

    let title = sanitize_string(&form.title);
    check_length(
        &mut errors,
        "title",
        &title,
        &Length {
            min: MIN_TITLE_LENGTH,
            max: MAX_TITLE_LENGTH,
            too_short: "El título debe tener al menos 5 caracteres.",
            too_long: "El título no puede tener más de 100 caracteres.",
        },
    );

    let content = sanitize_string(&form.content);
    check_length(
        &mut errors,
        "content",
        &content,
        &Length {
            min: MIN_CONTENT_LENGTH,
            max: MAX_CONTENT_LENGTH,
            too_short: "El contenido debe tener al menos 50 caracteres.",
            too_long: "El contenido no puede tener más de 10,000 caracteres.",
        },
    );

    check_file(&mut errors, "dni_image", form.dni_image.as_ref(), MAX_DNI_IMAGE_SIZE);
    check_file(
        &mut errors,
        "banner_image",
        form.banner_image.as_ref(),
        MAX_BANNER_IMAGE_SIZE,
    );

    match (errors.is_empty(), &form.dni_image, &form.banner_image) {
        (true, Some(dni), Some(banner)) => Ok(ValidRelato {
            submitter,
            title,
            content,
            dni_image: dni.clone(),
            banner_image: banner.clone(),
        }),
        _ => Err(errors),
    }
}

/// Validates the memorial entry form.
pub fn validate_portal_memoria_submission(
    form: &PortalMemoriaForm,
) -> Result<ValidPortalMemoria, FieldErrors> {
    let mut errors = FieldErrors::new();
    let submitter = check_submitter(&mut errors, &form.name, &form.surname, &form.phone);

    let description = sanitize_string(&form.description);
    check_length(
        &mut errors,
        "description",
        &description,
        &Length {
            min: MIN_DESCRIPTION_LENGTH,
            max: MAX_DESCRIPTION_LENGTH,
            too_short: "La descripción debe tener al menos 10 caracteres.",
            too_long: "La descripción no puede tener más de 1,000 caracteres.",
        },
    );

    check_file(&mut errors, "dni_image", form.dni_image.as_ref(), MAX_DNI_IMAGE_SIZE);
    check_file(&mut errors, "image", form.image.as_ref(), MAX_PORTAL_IMAGE_SIZE);

    match (errors.is_empty(), &form.dni_image, &form.image) {
        (true, Some(dni), Some(image)) => Ok(ValidPortalMemoria {
            submitter,
            description,
            dni_image: dni.clone(),
            image: image.clone(),
        }),
        _ => Err(errors),
    }
}

/// Whether `value` is a well-formed http(s) URL.
pub fn is_valid_url(value: &str) -> bool {
    url_pattern().is_match(value)
}

/// Checks the data about to be persisted, after uploads produced their URLs.
pub fn validate_new_submission(new: &NewSubmission) -> Result<(), FieldErrors> {
    let mut errors = FieldErrors::new();
    let required = "Este campo es obligatorio.";

    if new.submitter.name.is_empty() {
        errors.add("name", required);
    }
    if new.submitter.surname.is_empty() {
        errors.add("surname", required);
    }
    if !phone_pattern().is_match(&new.submitter.phone) {
        errors.add(
            "phone",
            "Número de teléfono inválido. Debe tener entre 10 y 15 dígitos.",
        );
    }
    if !is_valid_url(&new.dni_image_url) {
        errors.add("dni_image_url", "URL de imagen DNI inválida.");
    }

    match &new.content {
        SubmissionContent::Relato {
            title,
            content,
            banner_image_url,
        } => {
            if title.is_empty() {
                errors.add("title", required);
            }
            if content.is_empty() {
                errors.add("content", required);
            }
            if !is_valid_url(banner_image_url) {
                errors.add("banner_image_url", "URL de imagen banner inválida.");
            }
        }
        SubmissionContent::PortalMemoria {
            description,
            image_url,
        } => {
            if description.is_empty() {
                errors.add("description", required);
            }
            if !is_valid_url(image_url) {
                errors.add("image_url", "URL de imagen inválida.");
            }
        }
    }

    errors.into_result(())
}

//=========================================================================================
// Public Listing Queries
//=========================================================================================

/// A page of a public listing, optionally filtered by a search term.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRequest {
    /// 1-based page number.
    pub page: usize,
    pub per_page: usize,
    pub search: Option<String>,
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            page: 1,
            per_page: DEFAULT_PAGE_SIZE,
            search: None,
        }
    }
}

impl PageRequest {
    /// Fills defaults and checks bounds on raw query parameters.
    pub fn parse(
        page: Option<usize>,
        per_page: Option<usize>,
        search: Option<&str>,
    ) -> Result<Self, FieldErrors> {
        let mut errors = FieldErrors::new();
        let page = page.unwrap_or(1);
        let per_page = per_page.unwrap_or(DEFAULT_PAGE_SIZE);
        if page < 1 {
            errors.add("page", "La página debe ser mayor o igual a 1.");
        }
        if !(1..=MAX_PAGE_SIZE).contains(&per_page) {
            errors.add("per_page", "La cantidad por página debe estar entre 1 y 100.");
        }
        let search = search
            .map(sanitize_string)
            .filter(|term| !term.is_empty());
        errors.into_result(Self {
            page,
            per_page,
            search,
        })
    }

    /// Index of the page's first item. Saturates for pages far past the end.
    pub fn offset(&self) -> usize {
        self.page.saturating_sub(1).saturating_mul(self.per_page)
    }
}
