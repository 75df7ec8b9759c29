pub mod literature;
