mod credentials;
mod home;
mod mfa;
mod profile;
mod refresh;
mod roles;
mod token;

#[cfg(test)]
mod tests;
