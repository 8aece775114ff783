use crate::discovery::RoleSet;
use crate::server::error::HandlerResult;
use crate::server::page;
use crate::server::service::{MetadataService, Reply};

impl MetadataService {
    /// Profiles that can be selected, sorted and de-duplicated
    pub async fn available_roles(&self) -> RoleSet {
        RoleSet::dedup(Some(self.resolver.list_profiles(true).await))
    }

    pub async fn handle_home(&self) -> HandlerResult<Reply> {
        let roles = self.available_roles().await;
        Ok(Reply::html(page::render(roles.iter())))
    }
}
