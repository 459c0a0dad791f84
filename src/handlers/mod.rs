pub mod http;   // Account signup / login and health check
pub mod socket; // Socket.IO signaling events → broker
