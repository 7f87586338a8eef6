mod sets;

pub(crate) use sets::DequeSet;
