pub mod refresher;
pub mod session;

pub use refresher::spawn_price_refresher;
pub use session::{Collaborators, PortfolioView, RebalanceSession, SessionSettings, SessionStatus};
