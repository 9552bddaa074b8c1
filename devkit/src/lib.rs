/*!
# CyberGuard DevKit - Stubs et Utilitaires pour les tests

Bibliothèque facilitant les tests du client de synchronisation avec:
- Mock du canal push (connecteur contrôlé par le test)
- Backend HTTP/WebSocket stub
- Builders de frames au format du backend
- Harness et helpers d'attente
*/

pub mod mock_push;
pub mod stub_backend;
pub mod test_utils;

pub use mock_push::{MockConnector, SyncMessageBuilder};
pub use stub_backend::{RecordedRequest, StubBackend};
pub use test_utils::{fast_config, wait_until, TestHarness};
