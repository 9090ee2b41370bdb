//! Customer directory and identity provisioning.

use std::sync::Arc;

use async_trait::async_trait;
use secrecy::SecretString;
use thiserror::Error;
use tracing::{error, info, instrument, warn};

use online_retail_core::{CustomerId, Email};

use crate::cache::{CacheAside, keys};
use crate::config::CacheTtls;
use crate::db::{CustomerRecord, RetailStore};
use crate::error::RetailError;
use crate::models::{Customer, CustomerUpdate, DeleteOutcome, NewCustomer};

/// Errors reported by an [`IdentityProvisioner`].
#[derive(Debug, Error)]
pub enum IdentityError {
    /// The provider refused the account (duplicate user, weak password...).
    #[error("rejected: {0}")]
    Rejected(String),
    /// The provider could not be reached or failed internally.
    #[error("unavailable: {0}")]
    Unavailable(String),
}

/// Account details sent to the identity provider.
#[derive(Debug, Clone)]
pub struct IdentityProfile {
    pub customer_id: CustomerId,
    pub name: String,
    pub email: Email,
    pub password: Option<SecretString>,
}

/// External account provisioning, called after the local row commits.
#[async_trait]
pub trait IdentityProvisioner: Send + Sync {
    /// Create the remote account and return its id.
    async fn provision(&self, profile: &IdentityProfile) -> Result<String, IdentityError>;
}

/// Read and write access to customer profiles.
#[derive(Clone)]
pub struct CustomerDirectory {
    store: Arc<dyn RetailStore>,
    cache: CacheAside,
    ttls: CacheTtls,
    identity: Option<Arc<dyn IdentityProvisioner>>,
}

impl CustomerDirectory {
    #[must_use]
    pub fn new(store: Arc<dyn RetailStore>, cache: CacheAside, ttls: CacheTtls) -> Self {
        Self {
            store,
            cache,
            ttls,
            identity: None,
        }
    }

    /// Provision an external account for every customer added from now on.
    #[must_use]
    pub fn with_identity(mut self, identity: Arc<dyn IdentityProvisioner>) -> Self {
        self.identity = Some(identity);
        self
    }

    /// All customers.
    ///
    /// # Errors
    ///
    /// Returns [`RetailError::Store`] if the source of truth fails on a miss.
    #[instrument(skip(self))]
    pub async fn get_all(&self) -> Result<Vec<Customer>, RetailError> {
        let store = &self.store;
        Ok(self
            .cache
            .read_through(keys::CUSTOMERS, self.ttls.customers, || {
                store.list_customers()
            })
            .await?)
    }

    /// A customer by id, or `None`.
    ///
    /// # Errors
    ///
    /// Returns [`RetailError::Store`] if the source of truth fails on a miss.
    #[instrument(skip(self), fields(customer_id = %id))]
    pub async fn get_by_id(&self, id: CustomerId) -> Result<Option<Customer>, RetailError> {
        let store = &self.store;
        Ok(self
            .cache
            .read_through_optional(&keys::customer(id), self.ttls.customers, || {
                store.get_customer(id)
            })
            .await?)
    }

    /// A customer by email, or `None`.
    ///
    /// # Errors
    ///
    /// Returns [`RetailError::Store`] if the source of truth fails on a miss.
    #[instrument(skip(self), fields(email = %email))]
    pub async fn get_by_email(&self, email: &Email) -> Result<Option<Customer>, RetailError> {
        let store = &self.store;
        Ok(self
            .cache
            .read_through_optional(&keys::customer_by_email(email), self.ttls.customers, || {
                store.get_customer_by_email(email)
            })
            .await?)
    }

    /// Register a customer.
    ///
    /// The local row commits first. With a provisioner configured, the
    /// remote account is created afterwards, outside any transaction; if
    /// that fails the local row is deleted again and the error returned.
    /// If only recording the returned external id fails, the customer is
    /// returned with `external_id: None` and the id is logged.
    ///
    /// # Errors
    ///
    /// Returns [`RetailError::Store`] (for example a `Conflict` on a taken
    /// email) or [`RetailError::Identity`] if provisioning fails.
    #[instrument(skip(self, customer), fields(email = %customer.email))]
    pub async fn add(&self, customer: NewCustomer) -> Result<Customer, RetailError> {
        let NewCustomer {
            name,
            email,
            address,
            phone_number,
            password,
        } = customer;

        let mut created = self
            .store
            .insert_customer(&CustomerRecord {
                name,
                email,
                address,
                phone_number,
            })
            .await?;
        self.invalidate_profile(created.id, &[&created.email]).await;

        let Some(identity) = &self.identity else {
            return Ok(created);
        };

        let profile = IdentityProfile {
            customer_id: created.id,
            name: created.name.clone(),
            email: created.email.clone(),
            password,
        };
        match identity.provision(&profile).await {
            Ok(external_id) => {
                // Both accounts exist at this point; a failed link is logged
                // and the customer returned unlinked.
                match self
                    .store
                    .set_customer_external_id(created.id, &external_id)
                    .await
                {
                    Ok(_) => {
                        self.invalidate_profile(created.id, &[&created.email]).await;
                        info!(customer_id = %created.id, "identity provisioned");
                        created.external_id = Some(external_id);
                    }
                    Err(e) => {
                        error!(
                            customer_id = %created.id,
                            %external_id,
                            error = %e,
                            "identity provisioned but external id not recorded"
                        );
                    }
                }
                Ok(created)
            }
            Err(e) => {
                warn!(customer_id = %created.id, error = %e, "identity provisioning failed, removing customer");
                match self.store.delete_customer(created.id).await {
                    Ok(_) => self.invalidate_profile(created.id, &[&created.email]).await,
                    Err(cleanup) => {
                        error!(customer_id = %created.id, error = %cleanup, "compensating delete failed");
                    }
                }
                Err(e.into())
            }
        }
    }

    /// Replace a customer's profile. `None` if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`RetailError::Store`], including `Conflict` when the new
    /// email belongs to another customer.
    #[instrument(skip(self, update), fields(customer_id = %id))]
    pub async fn update(
        &self,
        id: CustomerId,
        update: &CustomerUpdate,
    ) -> Result<Option<Customer>, RetailError> {
        let Some(before) = self.store.get_customer(id).await? else {
            return Ok(None);
        };
        let updated = self.store.update_customer(id, update).await?;
        if updated.is_some() {
            self.invalidate_profile(id, &[&before.email, &update.email])
                .await;
            self.invalidate_embedded_views(id).await;
        }
        Ok(updated)
    }

    /// Delete a customer together with their cart.
    ///
    /// Customers with placed orders are kept and reported as
    /// [`DeleteOutcome::InUse`].
    ///
    /// # Errors
    ///
    /// Returns [`RetailError::Store`] if the delete fails.
    #[instrument(skip(self), fields(customer_id = %id))]
    pub async fn delete(&self, id: CustomerId) -> Result<DeleteOutcome, RetailError> {
        let Some(before) = self.store.get_customer(id).await? else {
            return Ok(DeleteOutcome::NotFound);
        };
        let outcome = self.store.delete_customer(id).await?;
        if outcome == DeleteOutcome::Deleted {
            self.invalidate_profile(id, &[&before.email]).await;
            self.cache.invalidate_all(&keys::cart_keys(id)).await;
        }
        Ok(outcome)
    }

    async fn invalidate_profile(&self, id: CustomerId, emails: &[&Email]) {
        let mut stale = vec![keys::CUSTOMERS.to_owned(), keys::customer(id)];
        stale.extend(emails.iter().map(|e| keys::customer_by_email(e)));
        self.cache.invalidate_all(&stale).await;
    }

    /// Cart and order views repeat the customer's name and email.
    async fn invalidate_embedded_views(&self, id: CustomerId) {
        let mut stale = keys::cart_keys(id).to_vec();
        stale.push(keys::ORDERS.to_owned());
        stale.push(keys::orders_of_customer(id));
        match self.store.list_orders_by_customer(id).await {
            Ok(orders) => stale.extend(orders.iter().map(|o| keys::order(o.order_id))),
            Err(e) => warn!(customer_id = %id, error = %e, "could not list orders to invalidate"),
        }
        self.cache.invalidate_all(&stale).await;
    }
}

impl std::fmt::Debug for CustomerDirectory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CustomerDirectory")
            .field("ttls", &self.ttls)
            .field("identity", &self.identity.is_some())
            .finish_non_exhaustive()
    }
}
