//! Mapping from permitted services to the front-end paths that host them

use crate::types::ServicePermission;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceRoute {
    Admin,
    Ticket,
}

impl ServiceRoute {
    /// Case-insensitive match on the service name; `admin` wins over `ticket`
    pub fn for_service(name: &str) -> Option<Self> {
        let name = name.to_lowercase();
        if name.contains("admin") {
            Some(Self::Admin)
        } else if name.contains("ticket") {
            Some(Self::Ticket)
        } else {
            None
        }
    }

    pub const fn path(self) -> &'static str {
        match self {
            Self::Admin => "/admin",
            Self::Ticket => "/ticket",
        }
    }
}

impl ServicePermission {
    pub fn route(&self) -> Option<ServiceRoute> {
        ServiceRoute::for_service(&self.name)
    }
}
