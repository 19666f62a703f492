use crate::actor_framework::Entity;

/// A customer account, owned by the account service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    pub id: String,
    pub name: String,
}

/// Payload for creating a new account.
#[derive(Debug, Clone)]
pub struct AccountCreate {
    pub name: String,
}

/// Payload for renaming an account.
#[derive(Debug, Clone)]
pub struct AccountPatch {
    pub name: Option<String>,
}

/// Accounts are listed unfiltered.
#[derive(Debug, Clone, Default)]
pub struct AccountFilter;

impl Account {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

impl Entity for Account {
    type Id = String;
    type CreatePayload = AccountCreate;
    type Patch = AccountPatch;
    type Filter = AccountFilter;

    const KIND: &'static str = "account";

    fn id(&self) -> &String {
        &self.id
    }

    fn from_create(id: String, payload: AccountCreate) -> Result<Self, String> {
        let name = payload.name.trim();
        if name.is_empty() {
            return Err("Account name required".to_string());
        }
        Ok(Self::new(id, name))
    }

    fn on_update(&mut self, patch: AccountPatch) -> Result<(), String> {
        if let Some(name) = patch.name {
            if name.trim().is_empty() {
                return Err("Account name required".to_string());
            }
            self.name = name;
        }
        Ok(())
    }

    fn matches(&self, _filter: &AccountFilter) -> bool {
        true
    }
}
