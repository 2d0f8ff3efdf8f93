pub mod distributed;
pub mod torchair;
