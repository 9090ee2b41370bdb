//! Customer directory records.

use secrecy::SecretString;
use serde::{Deserialize, Serialize};

use online_retail_core::{CustomerId, Email};

/// A customer profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Customer {
    pub id: CustomerId,
    pub name: String,
    pub email: Email,
    pub address: Option<String>,
    pub phone_number: Option<String>,
    /// Account id assigned by the identity provider, once provisioned.
    pub external_id: Option<String>,
}

/// Registration input.
///
/// The initial password is only forwarded to the identity provider; it is
/// never persisted locally.
#[derive(Debug, Clone)]
pub struct NewCustomer {
    pub name: String,
    pub email: Email,
    pub address: Option<String>,
    pub phone_number: Option<String>,
    pub password: Option<SecretString>,
}

/// Replacement profile fields for an existing customer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CustomerUpdate {
    pub name: String,
    pub email: Email,
    pub address: Option<String>,
    pub phone_number: Option<String>,
}
