// smartmarks state managers
// Managers own client-side state and reconcile it with the backend services.

pub mod sync_controller;
