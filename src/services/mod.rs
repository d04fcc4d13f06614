// smartmarks services
// Collaborator contracts (session store, record service, change feed), their Supabase and
// local implementations, and client settings.

pub mod change_feed;
pub mod listeners;
pub mod local_backend;
pub mod record_service;
pub mod session_store;
pub mod settings_engine;
pub mod supabase_client;
pub mod supabase_record_service;
pub mod supabase_session_store;
