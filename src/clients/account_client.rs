use crate::domain::Account;

impl_service_client!(AccountClient, Account, "account", account);
