mod competitions;
mod helpers;
mod scoring_flow;
mod users;
