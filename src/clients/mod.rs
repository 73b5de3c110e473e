pub mod meshy;
