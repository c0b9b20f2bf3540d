pub mod api_keys;

pub mod prelude {
    pub use super::api_keys::Entity as ApiKeys;
}
