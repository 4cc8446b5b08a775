mod arena;
mod boss;
mod bus;
mod encounter;
mod gate;
mod roster;
mod sequencer;
mod services;
mod session;
mod shop;

pub(crate) use services::{CombatModel, DialogueUi, ServiceError, Services, ShopEconomy};
pub(crate) use session::EventDirector;

#[cfg(test)]
mod tests {
    include!("tests.rs");
}
