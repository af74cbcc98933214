//! Shipping addresses of signed-in customers.

use std::sync::Arc;
use tracing::{info, instrument};

use super::require_user;
use crate::domain::aggregates::Address;
use crate::domain::value_objects::{AddressId, UserId};
use crate::store::{Store, UnitOfWork};
use crate::{Result, ShopError};

#[derive(Clone, Debug)]
pub struct AddressDraft {
    pub street: String,
    pub city: String,
    pub province: String,
    pub postal_code: String,
    pub country: String,
}

/// Partial address update; absent fields keep their value.
#[derive(Clone, Debug, Default)]
pub struct AddressPatch {
    pub street: Option<String>,
    pub city: Option<String>,
    pub province: Option<String>,
    pub postal_code: Option<String>,
    pub country: Option<String>,
}

fn apply(field: &mut String, value: Option<String>) {
    if let Some(value) = value.as_deref().map(str::trim).filter(|v| !v.is_empty()) {
        *field = value.to_string();
    }
}

#[derive(Clone)]
pub struct CustomerService {
    store: Arc<dyn Store>,
}

impl CustomerService {
    pub fn new(store: Arc<dyn Store>) -> Self { Self { store } }

    #[instrument(skip(self))]
    pub async fn addresses(&self, user: UserId) -> Result<Vec<Address>> {
        let mut uow = self.store.begin().await?;
        require_user(&mut *uow, user).await?;
        Ok(uow.addresses_of(user).await?)
    }

    #[instrument(skip(self, draft))]
    pub async fn add_address(&self, user: UserId, draft: AddressDraft) -> Result<Address> {
        let mut uow = self.store.begin().await?;
        require_user(&mut *uow, user).await?;
        let address = Address {
            id: AddressId::generate(),
            user_id: user,
            street: draft.street.trim().to_string(),
            city: draft.city.trim().to_string(),
            province: draft.province.trim().to_string(),
            postal_code: draft.postal_code.trim().to_string(),
            country: draft.country.trim().to_string(),
        };
        uow.insert_address(&address).await?;
        uow.commit().await?;
        info!(address = %address.id, "address added");
        Ok(address)
    }

    /// One of the caller's addresses. Addresses of other users are reported as missing.
    #[instrument(skip(self))]
    pub async fn address(&self, user: UserId, id: AddressId) -> Result<Address> {
        let mut uow = self.store.begin().await?;
        Self::owned(&mut *uow, user, id).await
    }

    #[instrument(skip(self, patch))]
    pub async fn update_address(&self, user: UserId, id: AddressId, patch: AddressPatch) -> Result<Address> {
        let mut uow = self.store.begin().await?;
        let mut address = Self::owned(&mut *uow, user, id).await?;
        apply(&mut address.street, patch.street);
        apply(&mut address.city, patch.city);
        apply(&mut address.province, patch.province);
        apply(&mut address.postal_code, patch.postal_code);
        apply(&mut address.country, patch.country);
        uow.update_address(&address).await?;
        uow.commit().await?;
        info!(address = %id, "address updated");
        Ok(address)
    }

    /// Refused while an order still ships to the address.
    #[instrument(skip(self))]
    pub async fn delete_address(&self, user: UserId, id: AddressId) -> Result<()> {
        let mut uow = self.store.begin().await?;
        Self::owned(&mut *uow, user, id).await?;
        if uow.address_in_use(id).await? {
            return Err(ShopError::BadRequest("Addresses used by orders cannot be deleted".into()));
        }
        uow.delete_address(id).await?;
        uow.commit().await?;
        info!(address = %id, "address deleted");
        Ok(())
    }

    async fn owned(uow: &mut dyn UnitOfWork, user: UserId, id: AddressId) -> Result<Address> {
        require_user(uow, user).await?;
        uow.find_address(id)
            .await?
            .filter(|a| a.belongs_to(user))
            .ok_or_else(|| ShopError::not_found("Address", id))
    }
}
