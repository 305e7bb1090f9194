//! Client (organization / tenant) model

use serde::{Deserialize, Serialize};

use super::{OrgType, PayloadShape, Shaped, Timestamps};
use crate::error::FieldErrors;
use crate::validation::{
    PHONE_MAX_LEN, check_max_len, parse_choice, require, slugify, validate_org_id,
};

pub const CLIENT_NAME_MAX_LEN: usize = 64;
pub const CLIENT_ADDRESS_MAX_LEN: usize = 128;

/// Client entity. `org_id` is the primary key and never changes once set.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Client {
    pub org_id: String,
    pub name: String,
    pub address: String,
    pub phone: String,
    pub org_type: OrgType,
    #[serde(flatten)]
    pub timestamps: Timestamps,
}

/// Client creation payload
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewClient {
    pub org_id: Option<String>,
    pub name: Option<String>,
    pub address: Option<String>,
    pub phone: Option<String>,
    pub org_type: Option<String>,
}

impl Shaped for NewClient {
    const SHAPE: PayloadShape = PayloadShape::Full;
}

impl NewClient {
    /// Validate the payload and resolve the organization id, slugifying the
    /// name when no id was supplied.
    pub fn validate(self) -> Result<Client, FieldErrors> {
        let mut errors = FieldErrors::new();

        let name = require(&mut errors, "name", self.name);
        if let Some(name) = &name {
            check_max_len(&mut errors, "name", name, CLIENT_NAME_MAX_LEN);
        }

        let org_type = require(&mut errors, "org_type", self.org_type)
            .and_then(|raw| parse_choice::<OrgType>(&mut errors, "org_type", &raw));

        let address = self.address.unwrap_or_default();
        check_max_len(&mut errors, "address", &address, CLIENT_ADDRESS_MAX_LEN);
        let phone = self.phone.unwrap_or_default();
        check_max_len(&mut errors, "phone", &phone, PHONE_MAX_LEN);

        let org_id = match self.org_id.map(|id| id.trim().to_string()) {
            Some(id) if !id.is_empty() => {
                if let Err(msg) = validate_org_id(&id) {
                    errors.add("org_id", msg);
                }
                Some(id)
            }
            _ => name.as_deref().map(slugify).and_then(|slug| {
                if slug.is_empty() {
                    errors.add(
                        "org_id",
                        "Could not derive an identifier from the name; supply org_id.",
                    );
                    None
                } else {
                    Some(slug)
                }
            }),
        };

        errors.into_result()?;

        match (org_id, name, org_type) {
            (Some(org_id), Some(name), Some(org_type)) => {
                Ok(Client {
                    org_id,
                    name,
                    address,
                    phone,
                    org_type,
                    timestamps: Timestamps::default(),
                })
            }
            _ => Err(FieldErrors::non_field("Incomplete client payload.")),
        }
    }
}

/// Client update payload. `org_id` is not accepted here.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ClientUpdate {
    pub name: Option<String>,
    pub address: Option<String>,
    pub phone: Option<String>,
    pub org_type: Option<String>,
}

impl Shaped for ClientUpdate {
    const SHAPE: PayloadShape = PayloadShape::Restricted;
}

/// A validated [`ClientUpdate`]
#[derive(Debug, Clone, Default)]
pub struct ClientChanges {
    pub name: Option<String>,
    pub address: Option<String>,
    pub phone: Option<String>,
    pub org_type: Option<OrgType>,
}

impl ClientUpdate {
    pub fn validate(self) -> Result<ClientChanges, FieldErrors> {
        let mut errors = FieldErrors::new();

        let name = match self.name {
            Some(raw) => require(&mut errors, "name", Some(raw)),
            None => None,
        };
        if let Some(name) = &name {
            check_max_len(&mut errors, "name", name, CLIENT_NAME_MAX_LEN);
        }
        if let Some(address) = &self.address {
            check_max_len(&mut errors, "address", address, CLIENT_ADDRESS_MAX_LEN);
        }
        if let Some(phone) = &self.phone {
            check_max_len(&mut errors, "phone", phone, PHONE_MAX_LEN);
        }
        let org_type = self
            .org_type
            .and_then(|raw| parse_choice::<OrgType>(&mut errors, "org_type", &raw));

        errors.into_result()?;

        Ok(ClientChanges {
            name,
            address: self.address,
            phone: self.phone,
            org_type,
        })
    }
}

impl ClientChanges {
    pub fn apply(self, client: &mut Client) {
        if let Some(name) = self.name {
            client.name = name;
        }
        if let Some(address) = self.address {
            client.address = address;
        }
        if let Some(phone) = self.phone {
            client.phone = phone;
        }
        if let Some(org_type) = self.org_type {
            client.org_type = org_type;
        }
    }
}
