//! Domain model for vehicle listings.
//!
//! The same attribute set travels through three record shapes: a pending
//! draft, a published listing and a sold snapshot. Validation and
//! normalization happen here, before anything reaches the record store.

use crate::error::{MarketError, MarketResult};
use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Maximum description length in characters.
pub const MAX_DESCRIPTION_CHARS: usize = 2000;

/// Administrative regions a vehicle can be listed in.
pub const STATES: &[&str] = &[
    "Andhra Pradesh",
    "Arunachal Pradesh",
    "Assam",
    "Bihar",
    "Chhattisgarh",
    "Goa",
    "Gujarat",
    "Haryana",
    "Himachal Pradesh",
    "Jharkhand",
    "Karnataka",
    "Kerala",
    "Madhya Pradesh",
    "Maharashtra",
    "Manipur",
    "Meghalaya",
    "Mizoram",
    "Nagaland",
    "Odisha",
    "Punjab",
    "Rajasthan",
    "Sikkim",
    "Tamil Nadu",
    "Telangana",
    "Tripura",
    "Uttar Pradesh",
    "Uttarakhand",
    "West Bengal",
    "Andaman and Nicobar Islands",
    "Chandigarh",
    "Dadra and Nagar Haveli and Daman and Diu",
    "Delhi",
    "Jammu and Kashmir",
    "Ladakh",
    "Lakshadweep",
    "Puducherry",
];

/// Fuel type of a listed vehicle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FuelType {
    Petrol,
    Diesel,
    Electric,
    Hybrid,
    #[serde(rename = "CNG")]
    Cng,
    #[serde(rename = "LPG")]
    Lpg,
}

impl FuelType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Petrol => "Petrol",
            Self::Diesel => "Diesel",
            Self::Electric => "Electric",
            Self::Hybrid => "Hybrid",
            Self::Cng => "CNG",
            Self::Lpg => "LPG",
        }
    }
}

impl fmt::Display for FuelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FuelType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        [
            Self::Petrol,
            Self::Diesel,
            Self::Electric,
            Self::Hybrid,
            Self::Cng,
            Self::Lpg,
        ]
        .into_iter()
        .find(|v| v.as_str().eq_ignore_ascii_case(s))
        .ok_or_else(|| format!("{s} is not a valid fuel type"))
    }
}

/// Transmission of a listed vehicle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Transmission {
    Manual,
    Automatic,
}

impl Transmission {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Manual => "Manual",
            Self::Automatic => "Automatic",
        }
    }
}

impl fmt::Display for Transmission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Transmission {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        [Self::Manual, Self::Automatic]
            .into_iter()
            .find(|v| v.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("{s} is not a valid transmission type"))
    }
}

/// Engine configuration of a listed vehicle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EngineType {
    #[serde(rename = "Inline 3")]
    Inline3,
    #[serde(rename = "Inline 4")]
    Inline4,
    #[serde(rename = "Inline 5")]
    Inline5,
    #[serde(rename = "Inline 6")]
    Inline6,
    V6,
    V8,
    V10,
    V12,
    V16,
    W12,
    W16,
    #[serde(rename = "Flat 4")]
    Flat4,
    #[serde(rename = "Flat 6")]
    Flat6,
    Rotary,
}

impl EngineType {
    pub const ALL: [EngineType; 14] = [
        Self::Inline3,
        Self::Inline4,
        Self::Inline5,
        Self::Inline6,
        Self::V6,
        Self::V8,
        Self::V10,
        Self::V12,
        Self::V16,
        Self::W12,
        Self::W16,
        Self::Flat4,
        Self::Flat6,
        Self::Rotary,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Inline3 => "Inline 3",
            Self::Inline4 => "Inline 4",
            Self::Inline5 => "Inline 5",
            Self::Inline6 => "Inline 6",
            Self::V6 => "V6",
            Self::V8 => "V8",
            Self::V10 => "V10",
            Self::V12 => "V12",
            Self::V16 => "V16",
            Self::W12 => "W12",
            Self::W16 => "W16",
            Self::Flat4 => "Flat 4",
            Self::Flat6 => "Flat 6",
            Self::Rotary => "Rotary",
        }
    }
}

impl fmt::Display for EngineType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EngineType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        Self::ALL
            .into_iter()
            .find(|v| v.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("{s} is not a valid engine type"))
    }
}

/// Trim and capitalize the first letter, as every free-text field is stored.
pub fn format_string(value: &str) -> String {
    let value = value.trim();
    let mut chars = value.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

/// Resolve a state name against the canonical region list, case-insensitively.
pub fn canonical_state(input: &str) -> Option<&'static str> {
    let input = input.trim();
    STATES.iter().copied().find(|s| s.eq_ignore_ascii_case(input))
}

/// Structured attributes shared by drafts, published listings and sold
/// snapshots.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VehicleAttributes {
    pub make: String,
    pub model: String,
    pub variant: Option<String>,
    pub year: i32,
    pub price: i64,
    pub fuel_type: FuelType,
    pub transmission: Transmission,
    /// Liters, at most one decimal place.
    pub engine_displacement: Option<f64>,
    pub engine_type: Option<EngineType>,
    /// Kilometers driven.
    pub odometer: i64,
    /// 1 = first owner.
    pub ownership: i32,
    pub state: String,
    pub location: String,
    pub description: String,
}

impl VehicleAttributes {
    /// Apply write-time normalization to every free-text field.
    pub fn normalize(&mut self) {
        self.make = format_string(&self.make);
        self.model = format_string(&self.model);
        if let Some(variant) = &self.variant {
            let formatted = format_string(variant);
            self.variant = if formatted.is_empty() { None } else { Some(formatted) };
        }
        if let Some(canonical) = canonical_state(&self.state) {
            self.state = canonical.to_string();
        } else {
            self.state = format_string(&self.state);
        }
        self.location = format_string(&self.location);
        self.description = format_string(&self.description);
    }

    /// Validate every field constraint. Call after [`normalize`](Self::normalize).
    pub fn validate(&self) -> MarketResult<()> {
        if self.make.is_empty() {
            return Err(MarketError::validation("make", "please enter the brand of your vehicle"));
        }
        if self.model.is_empty() {
            return Err(MarketError::validation("model", "please enter the model of your vehicle"));
        }

        let current_year = Utc::now().year();
        if self.year < 1900 || self.year > current_year {
            return Err(MarketError::validation(
                "year",
                format!("year must be between 1900 and {current_year}"),
            ));
        }
        if self.price < 0 {
            return Err(MarketError::validation("price", "price must be positive"));
        }
        if let Some(displacement) = self.engine_displacement {
            if !(0.0..=10.0).contains(&displacement) {
                return Err(MarketError::validation(
                    "engine_displacement",
                    "engine displacement must be between 0.0 and 10.0 liters",
                ));
            }
            let tenths = displacement * 10.0;
            if (tenths - tenths.round()).abs() > 1e-9 {
                return Err(MarketError::validation(
                    "engine_displacement",
                    "engine displacement can only have up to one decimal place",
                ));
            }
        }
        if self.odometer < 0 {
            return Err(MarketError::validation("odometer", "odometer reading must be positive"));
        }
        if self.ownership < 1 {
            return Err(MarketError::validation("ownership", "ownership number must be at least 1"));
        }
        if canonical_state(&self.state).is_none() {
            return Err(MarketError::validation(
                "state",
                format!("{} is not a valid state", self.state),
            ));
        }
        if self.location.is_empty() {
            return Err(MarketError::validation(
                "location",
                "please enter the location of your vehicle",
            ));
        }
        if self.description.is_empty() {
            return Err(MarketError::validation(
                "description",
                "please enter a description for your vehicle",
            ));
        }
        if self.description.chars().count() > MAX_DESCRIPTION_CHARS {
            return Err(MarketError::validation(
                "description",
                format!("description cannot exceed {MAX_DESCRIPTION_CHARS} characters"),
            ));
        }

        Ok(())
    }

    /// Build attributes from multipart form fields, normalizing and
    /// validating along the way.
    pub fn from_form(fields: &HashMap<String, String>) -> MarketResult<Self> {
        fn required<'a>(
            fields: &'a HashMap<String, String>,
            name: &str,
        ) -> MarketResult<&'a str> {
            fields
                .get(name)
                .map(String::as_str)
                .filter(|v| !v.trim().is_empty())
                .ok_or_else(|| MarketError::validation(name, "is required"))
        }

        fn optional<'a>(fields: &'a HashMap<String, String>, name: &str) -> Option<&'a str> {
            fields
                .get(name)
                .map(String::as_str)
                .filter(|v| !v.trim().is_empty())
        }

        fn parse_number<T: FromStr>(name: &str, value: &str) -> MarketResult<T> {
            value
                .trim()
                .parse::<T>()
                .map_err(|_| MarketError::validation(name, format!("{value} is not a valid number")))
        }

        let fuel_type: FuelType = required(fields, "fuel_type")?
            .parse()
            .map_err(|e: String| MarketError::validation("fuel_type", e))?;
        let transmission: Transmission = required(fields, "transmission")?
            .parse()
            .map_err(|e: String| MarketError::validation("transmission", e))?;
        let engine_type = optional(fields, "engine_type")
            .map(|v| v.parse::<EngineType>())
            .transpose()
            .map_err(|e: String| MarketError::validation("engine_type", e))?;
        let engine_displacement = optional(fields, "engine_displacement")
            .map(|v| parse_number::<f64>("engine_displacement", v))
            .transpose()?;

        let mut attrs = Self {
            make: required(fields, "make")?.to_string(),
            model: required(fields, "model")?.to_string(),
            variant: optional(fields, "variant").map(str::to_string),
            year: parse_number("year", required(fields, "year")?)?,
            price: parse_number("price", required(fields, "price")?)?,
            fuel_type,
            transmission,
            engine_displacement,
            engine_type,
            odometer: parse_number("odometer", required(fields, "odometer")?)?,
            ownership: parse_number("ownership", required(fields, "ownership")?)?,
            state: required(fields, "state")?.to_string(),
            location: required(fields, "location")?.to_string(),
            description: required(fields, "description")?.to_string(),
        };

        attrs.normalize();
        attrs.validate()?;
        Ok(attrs)
    }
}

/// An unmoderated submission, invisible to buyers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListingDraft {
    pub id: Uuid,
    #[serde(flatten)]
    pub attributes: VehicleAttributes,
    /// Ordered storage URLs; index 0 is the cover photo.
    pub images: Vec<String>,
    pub listed_by: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A moderated, buyer-visible listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublishedListing {
    pub id: Uuid,
    #[serde(flatten)]
    pub attributes: VehicleAttributes,
    pub images: Vec<String>,
    pub listed_by: Uuid,
    pub number_of_likes: i64,
    pub is_featured: bool,
    /// Immutable; set to creation time + the configured listing TTL.
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Immutable snapshot of a published listing at the moment of sale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SoldListing {
    pub id: Uuid,
    #[serde(flatten)]
    pub attributes: VehicleAttributes,
    pub images: Vec<String>,
    pub listed_by: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Role attached to an owner account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OwnerRole {
    User,
    Admin,
}

impl OwnerRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Admin => "admin",
        }
    }
}

impl FromStr for OwnerRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Self::User),
            "admin" => Ok(Self::Admin),
            other => Err(format!("{other} is not a valid owner role")),
        }
    }
}

/// Listing aggregates maintained on the owner account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Owner {
    pub id: Uuid,
    pub role: OwnerRole,
    /// Count of the owner's active drafts + published listings.
    pub total_vehicles: i64,
    pub listed_vehicles: Vec<Uuid>,
}

impl Owner {
    pub fn is_admin(&self) -> bool {
        self.role == OwnerRole::Admin
    }
}

/// Partial update of a published listing's attributes. Absent fields keep
/// their current values; images are not editable in place.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct VehicleUpdate {
    pub make: Option<String>,
    pub model: Option<String>,
    pub variant: Option<String>,
    pub year: Option<i32>,
    pub price: Option<i64>,
    pub fuel_type: Option<FuelType>,
    pub transmission: Option<Transmission>,
    pub engine_displacement: Option<f64>,
    pub engine_type: Option<EngineType>,
    pub odometer: Option<i64>,
    pub ownership: Option<i32>,
    pub state: Option<String>,
    pub location: Option<String>,
    pub description: Option<String>,
}

impl VehicleUpdate {
    /// Merge this update over existing attributes, then re-normalize and
    /// re-validate the result.
    pub fn apply_to(&self, current: &VehicleAttributes) -> MarketResult<VehicleAttributes> {
        let mut next = VehicleAttributes {
            make: self.make.clone().unwrap_or_else(|| current.make.clone()),
            model: self.model.clone().unwrap_or_else(|| current.model.clone()),
            variant: self.variant.clone().or_else(|| current.variant.clone()),
            year: self.year.unwrap_or(current.year),
            price: self.price.unwrap_or(current.price),
            fuel_type: self.fuel_type.unwrap_or(current.fuel_type),
            transmission: self.transmission.unwrap_or(current.transmission),
            engine_displacement: self.engine_displacement.or(current.engine_displacement),
            engine_type: self.engine_type.or(current.engine_type),
            odometer: self.odometer.unwrap_or(current.odometer),
            ownership: self.ownership.unwrap_or(current.ownership),
            state: self.state.clone().unwrap_or_else(|| current.state.clone()),
            location: self.location.clone().unwrap_or_else(|| current.location.clone()),
            description: self
                .description
                .clone()
                .unwrap_or_else(|| current.description.clone()),
        };
        next.normalize();
        next.validate()?;
        Ok(next)
    }
}
