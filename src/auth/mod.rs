mod jwt;

pub use jwt::{JwtManager, SocketIdentity};
