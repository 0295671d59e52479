use typed_builder::TypedBuilder;
use uuid::Uuid;

/// Cluster account names of the organization / project / allocation levels.
#[derive(Debug, Clone, TypedBuilder)]
pub struct AccountNaming {
    /// Parent of every organization account.
    #[builder(default = "waldur".to_string(), setter(into))]
    pub default_account: String,
    #[builder(default = "hpc_".to_string(), setter(into))]
    pub organization_prefix: String,
    #[builder(default = "hpc_".to_string(), setter(into))]
    pub project_prefix: String,
    #[builder(default = "hpc_".to_string(), setter(into))]
    pub allocation_prefix: String,
}

impl AccountNaming {
    pub fn organization(&self, id: Uuid) -> String {
        format!("{}{}", self.organization_prefix, id.simple())
    }

    pub fn project(&self, id: Uuid) -> String {
        format!("{}{}", self.project_prefix, id.simple())
    }

    pub fn allocation(&self, id: Uuid) -> String {
        format!("{}{}", self.allocation_prefix, id.simple())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_use_simple_hex() {
        let naming = AccountNaming::builder().project_prefix("prj_").build();
        let id = Uuid::parse_str("6f1c3a4e-0a7b-4a53-9d1e-1c2f3a4b5c6d").unwrap();
        assert_eq!(naming.allocation(id), "hpc_6f1c3a4e0a7b4a539d1e1c2f3a4b5c6d");
        assert_eq!(naming.project(id), "prj_6f1c3a4e0a7b4a539d1e1c2f3a4b5c6d");
        assert_eq!(naming.default_account, "waldur");
    }
}
