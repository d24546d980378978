// Testing Tools Library
//
// In-process stand-ins for the Pond runtime, used by the observer tests.
// Currently includes:
// - MockPond: scriptable session with subscription accounting
// - MockConnector: hands out a MockPond or a configured connection failure
// - fish: sample fish definitions (chat rooms, channel list, goods)

pub mod connector;
pub mod fish;
pub mod pond;
pub mod registry;

pub use connector::MockConnector;
pub use pond::MockPond;
