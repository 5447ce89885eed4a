//! Beneficiary registry: which receivers a client may pay.

use tracing::info;

use super::{Engine, EngineError, fetch};
use crate::model::{Beneficiary, BeneficiaryId, Client, ClientId, Entity};

impl Engine {
    /// Link `client` to `receiver`. Each sender/receiver pair has at most one
    /// active link; relinking a deleted pair reactivates the old link.
    pub async fn create_beneficiary(
        &self,
        client: ClientId,
        receiver: ClientId,
        name: &str,
    ) -> Result<Beneficiary, EngineError> {
        if client == receiver {
            return Err(EngineError::SelfBeneficiary(client));
        }

        let mut uow = self.store.begin().await;
        let existing =
            uow.first::<Beneficiary>(|b| b.client_id == client && b.receiver_id == receiver);
        if existing.as_ref().is_some_and(|b| b.is_active) {
            return Err(EngineError::DuplicateBeneficiary { client, receiver });
        }
        fetch::<Client>(&uow, client)?;
        fetch::<Client>(&uow, receiver)?;

        let beneficiary = match existing {
            Some(mut inactive) => {
                inactive.name = name.to_string();
                inactive.is_active = true;
                uow.update(&inactive)?;
                inactive
            }
            None => uow.insert(Beneficiary {
                id: 0,
                name: name.to_string(),
                client_id: client,
                receiver_id: receiver,
                is_active: true,
            })?,
        };
        uow.commit()?;

        info!(
            beneficiary = beneficiary.id,
            client, receiver, "beneficiary created"
        );
        Ok(beneficiary)
    }

    /// Active beneficiaries of `client`.
    pub async fn list_beneficiaries(&self, client: ClientId) -> Result<Vec<Beneficiary>, EngineError> {
        let uow = self.store.begin().await;
        fetch::<Client>(&uow, client)?;
        Ok(uow.select(|b: &Beneficiary| b.client_id == client && b.is_active))
    }

    /// Deactivate a beneficiary owned by `client`. An inactive link cannot be
    /// paid through until [`Engine::create_beneficiary`] reactivates it.
    pub async fn delete_beneficiary(
        &self,
        client: ClientId,
        beneficiary: BeneficiaryId,
    ) -> Result<Beneficiary, EngineError> {
        let mut uow = self.store.begin().await;
        fetch::<Client>(&uow, client)?;
        // a beneficiary owned by someone else is reported as missing
        let mut link = uow
            .first::<Beneficiary>(|b| b.id == beneficiary && b.client_id == client && b.is_active)
            .ok_or(EngineError::NotFound(Entity::Beneficiary, beneficiary))?;

        link.is_active = false;
        uow.update(&link)?;
        uow.commit()?;

        info!(beneficiary, client, "beneficiary deleted");
        Ok(link)
    }
}
